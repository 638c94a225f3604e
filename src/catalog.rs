use std::sync::LazyLock;

use regex::Regex;

static CODE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z0-9-]{2,12}$").unwrap());

/// English translations the upstream site serves.
pub const KNOWN_VERSIONS: &[&str] = &[
    "NIV", "KJV", "ESV", "NASB", "NLT", "CSB", "NKJV", "RSV", "MSG", "AMP", "CEB", "WEB",
    "YLT", "ASV", "GNV", "DARBY", "NET", "ERV", "HCSB", "MEV", "NOG", "TLB", "GW", "EXB",
    "ICB", "NIRV", "NLV", "EHV", "LSB", "LEB", "TLV", "CJB", "OJB", "RGT", "BST", "TPT",
    "PHILLIPS", "JUB", "GNB", "GNT", "CEV", "NCV", "NIVUK", "NRSVUE", "RSVCE", "NABRE",
    "ESVUK",
];

pub fn is_well_formed(code: &str) -> bool {
    CODE_RE.is_match(&code.to_uppercase())
}

/// Translation codes accepted by the service.
#[derive(Debug, Clone)]
pub struct Catalog {
    codes: Vec<String>,
}

impl Catalog {
    /// Built-in codes followed by any well-formed `extra` codes not already listed.
    pub fn new(extra: &[String]) -> Self {
        let mut codes: Vec<String> = KNOWN_VERSIONS.iter().map(|c| c.to_string()).collect();
        for code in extra {
            let code = code.trim().to_uppercase();
            if is_well_formed(&code) && !codes.contains(&code) {
                codes.push(code);
            }
        }
        Catalog { codes }
    }

    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    pub fn contains(&self, code: &str) -> bool {
        let code = code.trim().to_uppercase();
        is_well_formed(&code) && self.codes.contains(&code)
    }

    /// Upper-cased requested code (or `default` when blank) if it is in the catalog.
    pub fn resolve(&self, requested: Option<&str>, default: &str) -> Option<String> {
        let code = match requested.map(str::trim) {
            Some(c) if !c.is_empty() => c.to_uppercase(),
            _ => default.trim().to_uppercase(),
        };
        self.contains(&code).then_some(code)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Catalog::new(&[])
    }
}
