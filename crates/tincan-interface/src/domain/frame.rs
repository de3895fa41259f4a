//! EtherType inspection of hex-encoded Ethernet frames.

use cbt_bus::FrameClass;

/// Hex-character range of the EtherType field (bytes 12..14 of the frame).
pub const ETHERTYPE_RANGE: std::ops::Range<usize> = 24..28;

pub const ETHERTYPE_ARP: &str = "0806";
pub const ETHERTYPE_IPV4: &str = "0800";
pub const ETHERTYPE_IPV6: &str = "86DD";

/// The EtherType hex digits of `dataframe`, if the frame is long enough.
#[must_use]
pub fn ethertype(dataframe: &str) -> Option<&str> {
    dataframe.get(ETHERTYPE_RANGE)
}

/// Classify a hex-encoded frame by EtherType. Short frames are `Other`.
#[must_use]
pub fn classify_dataframe(dataframe: &str) -> FrameClass {
    match ethertype(dataframe) {
        Some(t) if t.eq_ignore_ascii_case(ETHERTYPE_ARP) => FrameClass::Arp,
        Some(t) if t.eq_ignore_ascii_case(ETHERTYPE_IPV4) || t.eq_ignore_ascii_case(ETHERTYPE_IPV6) => {
            FrameClass::Ip
        }
        _ => FrameClass::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DST_SRC: &str = "ffffffffffff0a1b2c3d4e5f";

    fn frame(ethertype: &str) -> String {
        format!("{DST_SRC}{ethertype}0001")
    }

    #[test]
    fn test_arp() {
        assert_eq!(classify_dataframe(&frame("0806")), FrameClass::Arp);
    }

    #[test]
    fn test_ipv4_and_ipv6() {
        assert_eq!(classify_dataframe(&frame("0800")), FrameClass::Ip);
        assert_eq!(classify_dataframe(&frame("86DD")), FrameClass::Ip);
        assert_eq!(classify_dataframe(&frame("86dd")), FrameClass::Ip);
    }

    #[test]
    fn test_other_ethertypes() {
        assert_eq!(classify_dataframe(&frame("88cc")), FrameClass::Other);
        assert_eq!(classify_dataframe(&frame("8100")), FrameClass::Other);
    }

    #[test]
    fn test_short_frame_is_other() {
        assert_eq!(classify_dataframe(""), FrameClass::Other);
        assert_eq!(classify_dataframe(&DST_SRC[..20]), FrameClass::Other);
        assert_eq!(ethertype("ffffffffffff0a1b2c3d4e5f080"), None);
    }

    #[test]
    fn test_non_ascii_does_not_panic() {
        // A multi-byte char straddling the range boundary must not panic.
        let odd = format!("{}é0806", &DST_SRC[..23]);
        assert_eq!(classify_dataframe(&odd), FrameClass::Other);
    }
}
