//! Annex-B NAL unit parsing

/// H.264 NAL unit types the muxer cares about
pub mod nal_type {
    pub const IDR: u8 = 5;
    pub const SPS: u8 = 7;
    pub const PPS: u8 = 8;
    pub const AUD: u8 = 9;
}

/// Type of a NAL unit (without start code)
pub fn unit_type(nal: &[u8]) -> u8 {
    nal.first().map(|b| b & 0x1F).unwrap_or(0)
}

/// Split an Annex-B byte stream into NAL units, stripping start codes
///
/// Both 3-byte (00 00 01) and 4-byte (00 00 00 01) start codes are accepted.
/// Trailing zero bytes before a start code are dropped.
pub fn split_annex_b(data: &[u8]) -> Vec<&[u8]> {
    let mut units = Vec::new();
    let mut start: Option<usize> = None;
    let mut i = 0;

    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            if let Some(s) = start {
                push_trimmed(&mut units, &data[s..i]);
            }
            i += 3;
            start = Some(i);
        } else {
            i += 1;
        }
    }

    if let Some(s) = start {
        push_trimmed(&mut units, &data[s..]);
    }

    units
}

fn push_trimmed<'a>(units: &mut Vec<&'a [u8]>, unit: &'a [u8]) {
    let end = unit.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
    if end > 0 {
        units.push(&unit[..end]);
    }
}

/// True if the access unit carries an IDR slice
pub fn contains_idr(units: &[&[u8]]) -> bool {
    units.iter().any(|nal| unit_type(nal) == nal_type::IDR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_mixed_start_codes() {
        let stream = [
            0, 0, 0, 1, 0x67, 0x42, 0x00, 0x1f, // SPS, 4-byte start code
            0, 0, 1, 0x68, 0xce, // PPS, 3-byte start code
            0, 0, 0, 1, 0x65, 0x88, 0x84, 0x00, // IDR slice
        ];
        let units = split_annex_b(&stream);
        assert_eq!(units.len(), 3);
        assert_eq!(units[0], &[0x67, 0x42, 0x00, 0x1f]);
        assert_eq!(units[1], &[0x68, 0xce]);
        assert_eq!(units[2], &[0x65, 0x88, 0x84]);
        assert_eq!(unit_type(units[0]), nal_type::SPS);
        assert!(contains_idr(&units));
    }

    #[test]
    fn test_no_start_code() {
        assert!(split_annex_b(&[0x65, 0x88]).is_empty());
        assert!(split_annex_b(&[]).is_empty());
    }

    #[test]
    fn test_non_idr_access_unit() {
        let stream = [0, 0, 0, 1, 0x41, 0x9a, 0x02];
        let units = split_annex_b(&stream);
        assert_eq!(units.len(), 1);
        assert!(!contains_idr(&units));
    }
}
