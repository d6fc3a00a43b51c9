use crate::record::AttackRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttackCategory {
    Ddos,
    SqlInjection,
    Phishing,
    Malware,
    Ransomware,
    Unknown,
}

impl AttackCategory {
    pub const ALL: [AttackCategory; 6] = [
        Self::Ddos,
        Self::SqlInjection,
        Self::Phishing,
        Self::Malware,
        Self::Ransomware,
        Self::Unknown,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Ddos => "DDoS",
            Self::SqlInjection => "SQL Injection",
            Self::Phishing => "Phishing",
            Self::Malware => "Malware",
            Self::Ransomware => "Ransomware",
            Self::Unknown => "Unknown",
        }
    }

    /// Exact label match; anything else, including a missing type, is `Unknown`.
    pub fn from_type(raw: Option<&str>) -> Self {
        raw.and_then(|raw| Self::ALL.into_iter().find(|c| c.label() == raw))
            .unwrap_or(Self::Unknown)
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Record count per category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    counts: [usize; 6],
}

impl Tally {
    pub fn get(&self, category: AttackCategory) -> usize {
        self.counts[category.index()]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// `(label, count)` in display order.
    pub fn rows(&self) -> impl Iterator<Item = (&'static str, usize)> + '_ {
        AttackCategory::ALL
            .into_iter()
            .map(|category| (category.label(), self.get(category)))
    }
}

pub fn tally(records: &[AttackRecord]) -> Tally {
    let mut out = Tally::default();
    for record in records {
        out.counts[AttackCategory::from_type(record.kind.as_deref()).index()] += 1;
    }
    out
}
