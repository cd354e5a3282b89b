//! Statistical geography hierarchy types.

use serde::{Deserialize, Serialize};

/// A region level, ordered finest first within each hierarchy.
/// See: Australian Statistical Geography Standard (ASGS) Edition 3
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RegionLevel {
    /// Statistical Area Level 1 (finest unit)
    Sa1,
    /// Statistical Area Level 2
    Sa2,
    /// Statistical Area Level 3
    Sa3,
    /// Statistical Area Level 4
    Sa4,
    /// Greater Capital City Statistical Area
    Gccsa,
    /// State / territory
    State,
    /// Indigenous Area
    Iare,
    /// Indigenous Region
    Ireg,
}

/// Independently sourced hierarchies attached to the same coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hierarchy {
    /// Main structure, joined against the SA1 layer
    Asgs,
    /// Indigenous structure, joined against the IARE layer
    Indigenous,
}

impl Hierarchy {
    pub fn all() -> &'static [Hierarchy] {
        &[Hierarchy::Asgs, Hierarchy::Indigenous]
    }

    /// Levels of this hierarchy, finest first
    pub fn levels(&self) -> &'static [RegionLevel] {
        match self {
            Hierarchy::Asgs => &[
                RegionLevel::Sa1,
                RegionLevel::Sa2,
                RegionLevel::Sa3,
                RegionLevel::Sa4,
                RegionLevel::Gccsa,
                RegionLevel::State,
            ],
            Hierarchy::Indigenous => &[RegionLevel::Iare, RegionLevel::Ireg],
        }
    }

    /// Logical attribute columns requested from the boundary layer
    pub fn columns(&self) -> Vec<&'static str> {
        self.levels().iter().flat_map(|l| l.columns()).collect()
    }

    pub fn label(&self) -> &'static str {
        match self {
            Hierarchy::Asgs => "ASGS",
            Hierarchy::Indigenous => "Indigenous",
        }
    }
}

impl RegionLevel {
    /// All levels in output column order
    pub fn all() -> &'static [RegionLevel] {
        &[
            RegionLevel::Sa1,
            RegionLevel::Sa2,
            RegionLevel::Sa3,
            RegionLevel::Sa4,
            RegionLevel::Gccsa,
            RegionLevel::State,
            RegionLevel::Iare,
            RegionLevel::Ireg,
        ]
    }

    pub fn hierarchy(&self) -> Hierarchy {
        match self {
            RegionLevel::Iare | RegionLevel::Ireg => Hierarchy::Indigenous,
            _ => Hierarchy::Asgs,
        }
    }

    pub fn code_column(&self) -> &'static str {
        match self {
            RegionLevel::Sa1 => "SA1_CODE",
            RegionLevel::Sa2 => "SA2_CODE",
            RegionLevel::Sa3 => "SA3_CODE",
            RegionLevel::Sa4 => "SA4_CODE",
            RegionLevel::Gccsa => "GCCSA_CODE",
            RegionLevel::State => "STATE_CODE",
            RegionLevel::Iare => "IARE_CODE",
            RegionLevel::Ireg => "IREG_CODE",
        }
    }

    /// SA1s are identified by code only
    pub fn name_column(&self) -> Option<&'static str> {
        match self {
            RegionLevel::Sa1 => None,
            RegionLevel::Sa2 => Some("SA2_NAME"),
            RegionLevel::Sa3 => Some("SA3_NAME"),
            RegionLevel::Sa4 => Some("SA4_NAME"),
            RegionLevel::Gccsa => Some("GCCSA_NAME"),
            RegionLevel::State => Some("STATE_NAME"),
            RegionLevel::Iare => Some("IARE_NAME"),
            RegionLevel::Ireg => Some("IREG_NAME"),
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &'static str> {
        std::iter::once(self.code_column()).chain(self.name_column())
    }
}

/// Code and name of the region a point falls in at one level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl RegionEntry {
    /// Build an entry, dropping blank values; `None` when both are blank.
    pub fn new(code: Option<String>, name: Option<String>) -> Option<Self> {
        let clean = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        let entry = Self {
            code: clean(code),
            name: clean(name),
        };
        if entry.code.is_none() && entry.name.is_none() {
            None
        } else {
            Some(entry)
        }
    }
}

/// Every region a point was classified into, across both hierarchies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionHierarchy {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sa1: Option<RegionEntry>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sa2: Option<RegionEntry>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sa3: Option<RegionEntry>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sa4: Option<RegionEntry>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gccsa: Option<RegionEntry>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<RegionEntry>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub iare: Option<RegionEntry>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ireg: Option<RegionEntry>,
}

impl RegionHierarchy {
    /// Set the entry for a given level
    pub fn set(&mut self, level: RegionLevel, entry: Option<RegionEntry>) {
        match level {
            RegionLevel::Sa1 => self.sa1 = entry,
            RegionLevel::Sa2 => self.sa2 = entry,
            RegionLevel::Sa3 => self.sa3 = entry,
            RegionLevel::Sa4 => self.sa4 = entry,
            RegionLevel::Gccsa => self.gccsa = entry,
            RegionLevel::State => self.state = entry,
            RegionLevel::Iare => self.iare = entry,
            RegionLevel::Ireg => self.ireg = entry,
        }
    }

    /// Get the entry for a given level
    pub fn get(&self, level: RegionLevel) -> Option<&RegionEntry> {
        match level {
            RegionLevel::Sa1 => self.sa1.as_ref(),
            RegionLevel::Sa2 => self.sa2.as_ref(),
            RegionLevel::Sa3 => self.sa3.as_ref(),
            RegionLevel::Sa4 => self.sa4.as_ref(),
            RegionLevel::Gccsa => self.gccsa.as_ref(),
            RegionLevel::State => self.state.as_ref(),
            RegionLevel::Iare => self.iare.as_ref(),
            RegionLevel::Ireg => self.ireg.as_ref(),
        }
    }

    pub fn code(&self, level: RegionLevel) -> Option<&str> {
        self.get(level).and_then(|e| e.code.as_deref())
    }

    pub fn name(&self, level: RegionLevel) -> Option<&str> {
        self.get(level).and_then(|e| e.name.as_deref())
    }

    /// Finest-level code, the marker of a completed classification
    pub fn finest_code(&self) -> Option<&str> {
        self.code(RegionLevel::Sa1)
    }

    pub fn clear(&mut self, hierarchy: Hierarchy) {
        for level in hierarchy.levels() {
            self.set(*level, None);
        }
    }

    pub fn is_empty(&self) -> bool {
        RegionLevel::all().iter().all(|l| self.get(*l).is_none())
    }

    /// A populated code must never sit below an absent coarser code.
    pub fn is_consistent(&self, hierarchy: Hierarchy) -> bool {
        let levels = hierarchy.levels();
        levels.iter().enumerate().all(|(i, level)| {
            self.code(*level).is_none() || levels[i + 1..].iter().all(|c| self.code(*c).is_some())
        })
    }
}
