// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Compact, normalized match predicates.
//!
//! A [`Minimatch`] holds a set of header field values together with a mask of the
//! bits that matter. Values are always stored masked, so two predicates matching
//! the same packets compare (and hash) equal.

use std::fmt::Display;
use std::net::{Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

const MAC_MASK: u64 = 0xffff_ffff_ffff;
const VID_MASK: u16 = 0x1fff;
const PCP_MASK: u8 = 0x07;
const DSCP_MASK: u8 = 0x3f;
const ECN_MASK: u8 = 0x03;

macro_rules! match_fields {
    ($($name:ident, $masked:ident: $ty:ty = $full:expr;)*) => {
        /// Header fields a flow can match on. Also used to describe a packet.
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct MatchFields {
            $(pub $name: $ty,)*
        }

        impl MatchFields {
            /// Mask with every bit of every field set
            pub const EXACT: MatchFields = MatchFields { $($name: $full,)* };

            #[must_use]
            pub fn and(&self, other: &Self) -> Self {
                Self { $($name: self.$name & other.$name,)* }
            }

            #[must_use]
            pub fn and_not(&self, other: &Self) -> Self {
                Self { $($name: self.$name & !other.$name,)* }
            }

            #[must_use]
            pub fn xor(&self, other: &Self) -> Self {
                Self { $($name: self.$name ^ other.$name,)* }
            }

            #[must_use]
            pub fn is_zero(&self) -> bool {
                $(self.$name == 0)&&*
            }

            fn fmt_masked(&self, mask: &Self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let mut sep = "";
                $(
                    if mask.$name != 0 {
                        if mask.$name == $full {
                            write!(f, "{sep}{}={:#x}", stringify!($name), self.$name)?;
                        } else {
                            write!(f, "{sep}{}={:#x}/{:#x}", stringify!($name), self.$name, mask.$name)?;
                        }
                        sep = ",";
                    }
                )*
                if sep.is_empty() {
                    write!(f, "*")?;
                }
                Ok(())
            }
        }

        impl MinimatchBuilder {
            $(
                #[must_use]
                pub fn $name(self, value: $ty) -> Self {
                    self.$masked(value, $full)
                }

                #[must_use]
                pub fn $masked(mut self, value: $ty, mask: $ty) -> Self {
                    self.fields.$name = value;
                    self.mask.$name = mask & $full;
                    self
                }
            )*
        }
    };
}

match_fields! {
    in_port, in_port_masked: u32 = u32::MAX;
    in_phy_port, in_phy_port_masked: u32 = u32::MAX;
    metadata, metadata_masked: u64 = u64::MAX;
    eth_dst, eth_dst_masked: u64 = MAC_MASK;
    eth_src, eth_src_masked: u64 = MAC_MASK;
    eth_type, eth_type_masked: u16 = u16::MAX;
    vlan_vid, vlan_vid_masked: u16 = VID_MASK;
    vlan_pcp, vlan_pcp_masked: u8 = PCP_MASK;
    ip_dscp, ip_dscp_masked: u8 = DSCP_MASK;
    ip_ecn, ip_ecn_masked: u8 = ECN_MASK;
    ip_proto, ip_proto_masked: u8 = u8::MAX;
    ipv4_src, ipv4_src_masked: u32 = u32::MAX;
    ipv4_dst, ipv4_dst_masked: u32 = u32::MAX;
    ipv6_src, ipv6_src_masked: u128 = u128::MAX;
    ipv6_dst, ipv6_dst_masked: u128 = u128::MAX;
    l4_src, l4_src_masked: u16 = u16::MAX;
    l4_dst, l4_dst_masked: u16 = u16::MAX;
    icmp_type, icmp_type_masked: u8 = u8::MAX;
    icmp_code, icmp_code_masked: u8 = u8::MAX;
    arp_op, arp_op_masked: u16 = u16::MAX;
    tunnel_id, tunnel_id_masked: u64 = u64::MAX;
}

/// A normalized match predicate: `fields == fields & mask` always holds
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "MinimatchDeser")]
pub struct Minimatch {
    fields: MatchFields,
    mask: MatchFields,
}

/// Shadow of [`Minimatch`] for deserialization, so that decoded predicates are
/// normalized by [`Minimatch::new`] like any other.
#[derive(Debug, Clone, Deserialize)]
struct MinimatchDeser {
    fields: MatchFields,
    mask: MatchFields,
}

impl From<MinimatchDeser> for Minimatch {
    fn from(raw: MinimatchDeser) -> Self {
        Minimatch::new(raw.fields, raw.mask)
    }
}

impl Minimatch {
    #[must_use]
    pub fn new(fields: MatchFields, mask: MatchFields) -> Self {
        let mask = mask.and(&MatchFields::EXACT);
        Self {
            fields: fields.and(&mask),
            mask,
        }
    }

    /// The predicate that matches every packet
    #[must_use]
    pub fn match_all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn builder() -> MinimatchBuilder {
        MinimatchBuilder::default()
    }

    #[must_use]
    pub fn fields(&self) -> &MatchFields {
        &self.fields
    }

    #[must_use]
    pub fn mask(&self) -> &MatchFields {
        &self.mask
    }

    #[must_use]
    pub fn is_match_all(&self) -> bool {
        self.mask.is_zero()
    }

    /// True if every packet matched by `self` is also matched by `other`, i.e.
    /// `other` wildcards at least the bits `self` wildcards and agrees on the rest.
    #[must_use]
    pub fn is_more_specific_than(&self, other: &Minimatch) -> bool {
        other.mask.and_not(&self.mask).is_zero() && self.fields.and(&other.mask) == other.fields
    }

    /// True if some packet is matched by both predicates
    #[must_use]
    pub fn overlaps(&self, other: &Minimatch) -> bool {
        let common = self.mask.and(&other.mask);
        self.fields.xor(&other.fields).and(&common).is_zero()
    }

    /// True if the packet described by `packet` is matched
    #[must_use]
    pub fn matches(&self, packet: &MatchFields) -> bool {
        packet.and(&self.mask) == self.fields
    }
}

impl Display for Minimatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.fields.fmt_masked(&self.mask, f)
    }
}

/// Incremental construction of a [`Minimatch`]
#[derive(Debug, Clone, Default)]
pub struct MinimatchBuilder {
    fields: MatchFields,
    mask: MatchFields,
}

fn prefix_mask_u32(len: u8) -> u32 {
    u32::MAX.checked_shl(32 - u32::from(len.min(32))).unwrap_or(0)
}

fn prefix_mask_u128(len: u8) -> u128 {
    u128::MAX.checked_shl(128 - u32::from(len.min(128))).unwrap_or(0)
}

fn mac_to_u64(mac: [u8; 6]) -> u64 {
    mac.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
}

impl MinimatchBuilder {
    #[must_use]
    pub fn eth_src_mac(self, mac: [u8; 6]) -> Self {
        self.eth_src(mac_to_u64(mac))
    }

    #[must_use]
    pub fn eth_dst_mac(self, mac: [u8; 6]) -> Self {
        self.eth_dst(mac_to_u64(mac))
    }

    #[must_use]
    pub fn ipv4_src_prefix(self, addr: Ipv4Addr, len: u8) -> Self {
        self.ipv4_src_masked(addr.to_bits(), prefix_mask_u32(len))
    }

    #[must_use]
    pub fn ipv4_dst_prefix(self, addr: Ipv4Addr, len: u8) -> Self {
        self.ipv4_dst_masked(addr.to_bits(), prefix_mask_u32(len))
    }

    #[must_use]
    pub fn ipv6_src_prefix(self, addr: Ipv6Addr, len: u8) -> Self {
        self.ipv6_src_masked(addr.to_bits(), prefix_mask_u128(len))
    }

    #[must_use]
    pub fn ipv6_dst_prefix(self, addr: Ipv6Addr, len: u8) -> Self {
        self.ipv6_dst_masked(addr.to_bits(), prefix_mask_u128(len))
    }

    #[must_use]
    pub fn build(self) -> Minimatch {
        Minimatch::new(self.fields, self.mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tcp_to(dst: &str, len: u8, port: u16) -> Minimatch {
        Minimatch::builder()
            .eth_type(0x0800)
            .ip_proto(6)
            .ipv4_dst_prefix(dst.parse().unwrap(), len)
            .l4_dst(port)
            .build()
    }

    #[test]
    fn test_normalization() {
        let a = Minimatch::builder()
            .ipv4_dst_masked(0x0a00_00ff, 0xffff_ff00)
            .build();
        let b = Minimatch::builder()
            .ipv4_dst_masked(0x0a00_0001, 0xffff_ff00)
            .build();
        assert_eq!(a, b);
        assert_eq!(a.fields().ipv4_dst, 0x0a00_0000);

        // bits outside of the field width are dropped
        let c = Minimatch::builder().vlan_vid_masked(0xffff, 0xffff).build();
        assert_eq!(c.mask().vlan_vid, 0x1fff);
        assert_eq!(c.fields().vlan_vid, 0x1fff);
    }

    #[test]
    fn test_deserialize_normalizes() {
        let subnet = Minimatch::builder()
            .ipv4_dst_prefix("10.0.0.0".parse().unwrap(), 24)
            .build();
        let yaml = serde_yaml_ng::to_string(&subnet).unwrap();
        // host bits set in the value, outside of the mask
        let host_bits = yaml.replacen("ipv4_dst: 167772160", "ipv4_dst: 167772165", 1);
        assert_ne!(yaml, host_bits);
        let decoded: Minimatch = serde_yaml_ng::from_str(&host_bits).unwrap();
        assert_eq!(decoded, subnet);
        assert_eq!(decoded.fields().ipv4_dst, 0x0a00_0000);
    }

    #[test]
    fn test_more_specific() {
        let host = tcp_to("10.0.0.1", 32, 80);
        let subnet = Minimatch::builder()
            .eth_type(0x0800)
            .ipv4_dst_prefix("10.0.0.0".parse().unwrap(), 24)
            .build();
        assert!(host.is_more_specific_than(&subnet));
        assert!(!subnet.is_more_specific_than(&host));
        assert!(host.is_more_specific_than(&Minimatch::match_all()));
        assert!(host.is_more_specific_than(&host));

        let other = tcp_to("10.0.1.1", 32, 80);
        assert!(!other.is_more_specific_than(&subnet));
    }

    #[test]
    fn test_overlap() {
        let a = tcp_to("10.0.0.0", 24, 80);
        let b = tcp_to("10.0.0.7", 32, 80);
        let c = tcp_to("10.0.0.7", 32, 443);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!b.overlaps(&c));
        assert!(Minimatch::match_all().overlaps(&c));
    }

    #[test]
    fn test_matches_packet() {
        let m = tcp_to("192.168.1.0", 24, 22);
        let mut pkt = MatchFields {
            eth_type: 0x0800,
            ip_proto: 6,
            ipv4_dst: u32::from(Ipv4Addr::new(192, 168, 1, 42)),
            l4_dst: 22,
            l4_src: 5555,
            ..Default::default()
        };
        assert!(m.matches(&pkt));
        pkt.l4_dst = 23;
        assert!(!m.matches(&pkt));
    }

    #[test]
    fn test_display() {
        let m = Minimatch::builder()
            .in_port(3)
            .ipv4_dst_masked(0x0a00_0000, 0xff00_0000)
            .build();
        assert_eq!(m.to_string(), "in_port=0x3,ipv4_dst=0xa000000/0xff000000");
        assert_eq!(Minimatch::match_all().to_string(), "*");
    }

    #[test]
    fn test_more_specific_is_consistent_with_matches() {
        bolero::check!()
            .with_type()
            .for_each(|(a, amask, b, bmask, pkt): &(u32, u32, u32, u32, u32)| {
                let ma = Minimatch::builder().ipv4_src_masked(*a, *amask).build();
                let mb = Minimatch::builder().ipv4_src_masked(*b, *bmask).build();
                let packet = MatchFields {
                    ipv4_src: *pkt,
                    ..Default::default()
                };
                if ma.is_more_specific_than(&mb) && ma.matches(&packet) {
                    assert!(mb.matches(&packet));
                }
                if ma.matches(&packet) && mb.matches(&packet) {
                    assert!(ma.overlaps(&mb));
                }
            });
    }
}
