// Copyright 2023 Greptime Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use serde::{Deserialize, Serialize};

use crate::data_type::{congruent, Type};

/// An ordered collection of named event layouts, used by sources to detect
/// the layout of incoming events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    types: Vec<Type>,
}

impl Schema {
    pub fn new(types: Vec<Type>) -> Schema {
        Schema { types }
    }

    /// Registers a type, replacing a previous one of the same name.
    pub fn add(&mut self, ty: Type) {
        if let Some(slot) = self
            .types
            .iter_mut()
            .find(|t| t.name().is_some() && t.name() == ty.name())
        {
            *slot = ty;
        } else {
            self.types.push(ty);
        }
    }

    pub fn find(&self, name: &str) -> Option<&Type> {
        self.types.iter().find(|t| t.name() == Some(name))
    }

    /// Finds the first registered type congruent to `ty`.
    pub fn find_congruent(&self, ty: &Type) -> Option<&Type> {
        self.types.iter().find(|t| congruent(t, ty))
    }

    pub fn types(&self) -> &[Type] {
        &self.types
    }
}
