use std::cmp::Ordering;
use std::fmt;

/// Numeric, dot-segment-wise version ordering.
///
/// `15.4` sorts above `15.3.2` and `1.10` above `1.9`, which a plain string
/// comparison gets wrong. Missing segments compare as zero, so `15.4` and
/// `15.4.0` are equal. Package versions may carry a non-numeric tail inside
/// a segment (`3.0_git12`); the tail is compared lexicographically after the
/// numeric prefix.
#[derive(Debug, Clone, Eq)]
pub struct DotVersion {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Segment {
    number: u64,
    suffix: String,
}

fn parse_segment(raw: &str) -> Segment {
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    Segment {
        number: raw[..split].parse().unwrap_or(0),
        suffix: raw[split..].to_string(),
    }
}

impl DotVersion {
    pub fn parse(raw: &str) -> Self {
        Self {
            segments: raw.split('.').map(parse_segment).collect(),
        }
    }
}

impl Ord for DotVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let zero = Segment {
            number: 0,
            suffix: String::new(),
        };
        let len = self.segments.len().max(other.segments.len());
        for i in 0..len {
            let a = self.segments.get(i).unwrap_or(&zero);
            let b = other.segments.get(i).unwrap_or(&zero);
            match a.cmp(b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for DotVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for DotVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl fmt::Display for DotVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}{}", segment.number, segment.suffix)?;
        }
        Ok(())
    }
}
