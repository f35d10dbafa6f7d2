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

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display, Formatter};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

pub use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use snafu::OptionExt;

use crate::error::{
    InvalidPrefixLengthSnafu, ParseAddressSnafu, ParsePortSnafu, ParseSubnetSnafu, Result,
};

pub type OrderedF64 = OrderedFloat<f64>;

/// An IPv4 or IPv6 address in 16-byte form.
///
/// IPv4 addresses are embedded as v4-mapped v6 addresses (`::ffff:0:0/96`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct Address([u8; 16]);

impl Address {
    pub fn from_bytes(bytes: [u8; 16]) -> Address {
        Address(bytes)
    }

    pub fn from_v4(addr: Ipv4Addr) -> Address {
        Address(addr.to_ipv6_mapped().octets())
    }

    pub fn from_v6(addr: Ipv6Addr) -> Address {
        Address(addr.octets())
    }

    pub fn bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Whether the address embeds an IPv4 address (v4-mapped prefix).
    pub fn is_v4(&self) -> bool {
        self.0[..10] == [0u8; 10] && self.0[10] == 0xff && self.0[11] == 0xff
    }

    /// Zeroes all bits past `prefix`, counted from the most significant bit.
    /// For v4-embedded addresses `prefix` refers to the v4 bits.
    pub fn masked(&self, prefix: u8) -> Address {
        let top = if self.is_v4() {
            96 + u32::from(prefix.min(32))
        } else {
            u32::from(prefix.min(128))
        };
        let mut bytes = self.0;
        for (i, byte) in bytes.iter_mut().enumerate() {
            let bit = i as u32 * 8;
            if bit + 8 <= top {
                continue;
            }
            if bit >= top {
                *byte = 0;
            } else {
                *byte &= 0xffu8 << (8 - (top - bit));
            }
        }
        Address(bytes)
    }
}

impl From<Ipv4Addr> for Address {
    fn from(addr: Ipv4Addr) -> Address {
        Address::from_v4(addr)
    }
}

impl From<Ipv6Addr> for Address {
    fn from(addr: Ipv6Addr) -> Address {
        Address::from_v6(addr)
    }
}

impl FromStr for Address {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Address> {
        match s.parse::<std::net::IpAddr>() {
            Ok(std::net::IpAddr::V4(a)) => Ok(Address::from_v4(a)),
            Ok(std::net::IpAddr::V6(a)) => Ok(Address::from_v6(a)),
            Err(_) => ParseAddressSnafu { input: s }.fail(),
        }
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_v4() {
            let v4 = Ipv4Addr::new(self.0[12], self.0[13], self.0[14], self.0[15]);
            write!(f, "{v4}")
        } else {
            write!(f, "{}", Ipv6Addr::from(self.0))
        }
    }
}

/// A network address plus prefix length.
///
/// The prefix length is in native terms: `0..=32` for v4-embedded networks,
/// `0..=128` otherwise. Host bits are zeroed on construction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct Subnet {
    network: Address,
    length: u8,
}

impl Subnet {
    pub fn new(network: Address, length: u8) -> Result<Subnet> {
        let max = if network.is_v4() { 32 } else { 128 };
        snafu::ensure!(
            u16::from(length) <= max,
            InvalidPrefixLengthSnafu {
                length: u16::from(length)
            }
        );
        Ok(Subnet {
            network: network.masked(length),
            length,
        })
    }

    pub fn network(&self) -> Address {
        self.network
    }

    pub fn length(&self) -> u8 {
        self.length
    }

    /// Whether the subnet denotes a single address (`/32` v4, `/128` v6).
    pub fn is_host(&self) -> bool {
        let max = if self.network.is_v4() { 32 } else { 128 };
        self.length == max
    }
}

impl FromStr for Subnet {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Subnet> {
        let (addr, len) = s
            .split_once('/')
            .with_context(|| ParseSubnetSnafu { input: s })?;
        let network: Address = addr
            .parse()
            .ok()
            .with_context(|| ParseSubnetSnafu { input: s })?;
        let length: u8 = len
            .parse()
            .ok()
            .with_context(|| ParseSubnetSnafu { input: s })?;
        Subnet::new(network, length)
    }
}

impl Display for Subnet {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.length)
    }
}

/// Transport protocol of a port.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub enum Protocol {
    #[default]
    Unknown,
    Tcp,
    Udp,
    Icmp,
}

impl Protocol {
    pub fn as_u8(self) -> u8 {
        match self {
            Protocol::Unknown => 0,
            Protocol::Tcp => 1,
            Protocol::Udp => 2,
            Protocol::Icmp => 3,
        }
    }
}

impl Display for Protocol {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Protocol::Unknown => "?",
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Icmp => "icmp",
        };
        write!(f, "{s}")
    }
}

/// A transport-layer port.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct Port {
    number: u16,
    protocol: Protocol,
}

impl Port {
    pub fn new(number: u16, protocol: Protocol) -> Port {
        Port { number, protocol }
    }

    pub fn number(&self) -> u16 {
        self.number
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }
}

impl FromStr for Port {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Port> {
        let (num, proto) = s
            .split_once('/')
            .with_context(|| ParsePortSnafu { input: s })?;
        let number: u16 = num
            .parse()
            .ok()
            .with_context(|| ParsePortSnafu { input: s })?;
        let protocol = match proto {
            "tcp" => Protocol::Tcp,
            "udp" => Protocol::Udp,
            "icmp" => Protocol::Icmp,
            "?" => Protocol::Unknown,
            _ => return ParsePortSnafu { input: s }.fail(),
        };
        Ok(Port { number, protocol })
    }
}

impl Display for Port {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.number, self.protocol)
    }
}

/// Data holds a single runtime value of any [Type](crate::data_type::Type).
///
/// Record values are represented as vectors of their field values, in field
/// order. `Double` wraps [OrderedFloat] so values are totally ordered and
/// hashable.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub enum Data {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(OrderedF64),
    /// Nanoseconds.
    Duration(i64),
    /// Nanoseconds since the UNIX epoch.
    Timestamp(i64),
    String(String),
    Pattern(String),
    Address(Address),
    Subnet(Subnet),
    Port(Port),
    Enum(String),
    Vector(Vec<Data>),
    Set(BTreeSet<Data>),
    Map(BTreeMap<Data, Data>),
}

impl Data {
    pub fn is_none(&self) -> bool {
        matches!(self, Data::None)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Data::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Data::UInt(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Data::Int(x) => Some(*x),
            _ => None,
        }
    }
}

impl From<bool> for Data {
    fn from(x: bool) -> Data {
        Data::Bool(x)
    }
}

impl From<i64> for Data {
    fn from(x: i64) -> Data {
        Data::Int(x)
    }
}

impl From<u64> for Data {
    fn from(x: u64) -> Data {
        Data::UInt(x)
    }
}

impl From<f64> for Data {
    fn from(x: f64) -> Data {
        Data::Double(OrderedFloat(x))
    }
}

impl From<&str> for Data {
    fn from(x: &str) -> Data {
        Data::String(x.to_string())
    }
}

impl From<Address> for Data {
    fn from(x: Address) -> Data {
        Data::Address(x)
    }
}

impl From<Subnet> for Data {
    fn from(x: Subnet) -> Data {
        Data::Subnet(x)
    }
}

impl From<Port> for Data {
    fn from(x: Port) -> Data {
        Data::Port(x)
    }
}

impl Display for Data {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Data::None => write!(f, "nil"),
            Data::Bool(x) => write!(f, "{x}"),
            Data::Int(x) => write!(f, "{x}"),
            Data::UInt(x) => write!(f, "{x}"),
            Data::Double(x) => write!(f, "{x}"),
            Data::Duration(x) => write!(f, "{x}ns"),
            Data::Timestamp(x) => write!(f, "@{x}"),
            Data::String(x) => write!(f, "{x:?}"),
            Data::Pattern(x) => write!(f, "/{x}/"),
            Data::Address(x) => write!(f, "{x}"),
            Data::Subnet(x) => write!(f, "{x}"),
            Data::Port(x) => write!(f, "{x}"),
            Data::Enum(x) => write!(f, "{x}"),
            Data::Vector(xs) => {
                let items = xs.iter().map(|x| x.to_string()).collect::<Vec<_>>();
                write!(f, "[{}]", items.join(", "))
            }
            Data::Set(xs) => {
                let items = xs.iter().map(|x| x.to_string()).collect::<Vec<_>>();
                write!(f, "{{{}}}", items.join(", "))
            }
            Data::Map(xs) => {
                let items = xs
                    .iter()
                    .map(|(k, v)| format!("{k} -> {v}"))
                    .collect::<Vec<_>>();
                write!(f, "{{{}}}", items.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v4_embedding() {
        let a: Address = "10.0.0.1".parse().unwrap();
        assert!(a.is_v4());
        assert_eq!(a.bytes()[12..], [10, 0, 0, 1]);
        assert_eq!(a.to_string(), "10.0.0.1");

        let b: Address = "::1".parse().unwrap();
        assert!(!b.is_v4());
        assert_eq!(b.to_string(), "::1");
    }

    #[test]
    fn test_subnet_masks_host_bits() {
        let sn: Subnet = "10.0.0.42/24".parse().unwrap();
        assert_eq!(sn.network().to_string(), "10.0.0.0");
        assert_eq!(sn.length(), 24);
        assert!(!sn.is_host());

        let host: Subnet = "::1/128".parse().unwrap();
        assert!(host.is_host());
    }

    #[test]
    fn test_subnet_rejects_long_prefix() {
        assert!(Subnet::new("10.0.0.1".parse().unwrap(), 33).is_err());
        assert!(Subnet::new("::1".parse().unwrap(), 128).is_ok());
    }

    #[test]
    fn test_port_parse_display() {
        let p: Port = "22/tcp".parse().unwrap();
        assert_eq!(p.number(), 22);
        assert_eq!(p.protocol(), Protocol::Tcp);
        assert_eq!("80/?".parse::<Port>().unwrap().protocol(), Protocol::Unknown);
        assert!("80".parse::<Port>().is_err());
    }

    #[test]
    fn test_data_is_ordered() {
        let mut set = BTreeSet::new();
        set.insert(Data::from(1.5));
        set.insert(Data::from(0.5));
        set.insert(Data::from(1.5));
        assert_eq!(set.len(), 2);
    }
}
