//! Built-in table of supported dive computers.

use crate::device::Family;

/// Static description of one dive computer model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub vendor: &'static str,
    pub product: &'static str,
    pub family: Family,
    pub model: u32,
}

const DESCRIPTORS: &[Descriptor] = &[
    Descriptor {
        vendor: "Reefnet",
        product: "Sensus",
        family: Family::ReefnetSensus,
        model: 1,
    },
    Descriptor {
        vendor: "Reefnet",
        product: "Sensus Pro",
        family: Family::ReefnetSensusPro,
        model: 2,
    },
    Descriptor {
        vendor: "Reefnet",
        product: "Sensus Ultra",
        family: Family::ReefnetSensusUltra,
        model: 3,
    },
];

pub fn descriptors() -> impl Iterator<Item = Descriptor> {
    DESCRIPTORS.iter().copied()
}

/// Find the descriptor whose product name appears in `name`.
///
/// Matching is case-insensitive and prefers the longest product name, so
/// "Reefnet Sensus Ultra" resolves to the Ultra rather than the Sensus.
pub fn identify(name: &str) -> Option<Descriptor> {
    let name = name.to_lowercase();
    descriptors()
        .filter(|d| name.contains(&d.product.to_lowercase()))
        .max_by_key(|d| d.product.len())
}

pub fn find(family: Family, model: u32) -> Option<Descriptor> {
    descriptors().find(|d| d.family == family && d.model == model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identify_prefers_longest_match() {
        assert_eq!(
            identify("Sensus").map(|d| d.family),
            Some(Family::ReefnetSensus)
        );
        assert_eq!(
            identify("Reefnet Sensus Ultra").map(|d| d.family),
            Some(Family::ReefnetSensusUltra)
        );
        assert_eq!(identify("sensus pro").map(|d| d.model), Some(2));
        assert_eq!(identify("Suunto Vyper"), None);
    }

    #[test]
    fn test_find() {
        let d = find(Family::ReefnetSensus, 1).unwrap();
        assert_eq!(d.vendor, "Reefnet");
        assert_eq!(d.product, "Sensus");
        assert_eq!(find(Family::ReefnetSensus, 2), None);
    }

    #[test]
    fn test_table_is_unique() {
        let all: Vec<_> = descriptors().collect();
        assert_eq!(all.len(), 3);
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert!(a.family != b.family || a.model != b.model);
            }
        }
    }
}
