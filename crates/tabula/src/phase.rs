//! The fixed migration phase order.
//!
//! Everything that narrows or removes comes before everything that widens or
//! adds. Every phase finishes for every change set before the next starts.

/// One migration phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    PreUpgradeHooks,
    DroppingStoredProcs,
    DroppingTriggers,
    DroppingSeqs,
    DroppingForeignKeys,
    DroppingIndexes,
    AlteringFields,
    DroppingChangedFields,
    SettingNull,
    RenamingTables,
    AddingTables,
    AddingFields,
    SettingNotNull,
    AddingIndexes,
    AddingForeignKeys,
    AddingSeqs,
    AddingTriggers,
    AddingStoredProcs,
    DroppingFields,
    DroppingTables,
    Finishing,
}

impl Phase {
    pub const ALL: [Phase; 21] = [
        Phase::PreUpgradeHooks,
        Phase::DroppingStoredProcs,
        Phase::DroppingTriggers,
        Phase::DroppingSeqs,
        Phase::DroppingForeignKeys,
        Phase::DroppingIndexes,
        Phase::AlteringFields,
        Phase::DroppingChangedFields,
        Phase::SettingNull,
        Phase::RenamingTables,
        Phase::AddingTables,
        Phase::AddingFields,
        Phase::SettingNotNull,
        Phase::AddingIndexes,
        Phase::AddingForeignKeys,
        Phase::AddingSeqs,
        Phase::AddingTriggers,
        Phase::AddingStoredProcs,
        Phase::DroppingFields,
        Phase::DroppingTables,
        Phase::Finishing,
    ];

    /// The name before-hooks use to pick this phase.
    pub fn name(self) -> &'static str {
        match self {
            Phase::PreUpgradeHooks => "pre-upgrade-hooks",
            Phase::DroppingStoredProcs => "dropping-storedprocs",
            Phase::DroppingTriggers => "dropping-triggers",
            Phase::DroppingSeqs => "dropping-seqs",
            Phase::DroppingForeignKeys => "dropping-fkeys",
            Phase::DroppingIndexes => "dropping-indexes",
            Phase::AlteringFields => "altering-fields",
            Phase::DroppingChangedFields => "dropping-changed-fields",
            Phase::SettingNull => "setting-null",
            Phase::RenamingTables => "renaming-tables",
            Phase::AddingTables => "adding-tables",
            Phase::AddingFields => "adding-fields",
            Phase::SettingNotNull => "setting-notnull",
            Phase::AddingIndexes => "adding-indexes",
            Phase::AddingForeignKeys => "adding-fkeys",
            Phase::AddingSeqs => "adding-seqs",
            Phase::AddingTriggers => "adding-triggers",
            Phase::AddingStoredProcs => "adding-storedprocs",
            Phase::DroppingFields => "dropping-fields",
            Phase::DroppingTables => "dropping-tables",
            Phase::Finishing => "finishing",
        }
    }

    pub fn from_name(name: &str) -> Option<Phase> {
        Phase::ALL.into_iter().find(|p| p.name() == name)
    }

    /// Whether before-hooks may be scheduled in this phase. Trigger phases
    /// run per table with nothing sensible to hook into.
    pub fn accepts_hooks(self) -> bool {
        !matches!(self, Phase::DroppingTriggers | Phase::AddingTriggers)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_and_names() {
        assert!(Phase::DroppingForeignKeys < Phase::DroppingIndexes);
        assert!(Phase::RenamingTables < Phase::AddingFields);
        assert!(Phase::AddingFields < Phase::SettingNotNull);
        for phase in Phase::ALL {
            assert_eq!(Phase::from_name(phase.name()), Some(phase));
        }
        assert_eq!(Phase::from_name("adding-everything"), None);
        assert!(!Phase::AddingTriggers.accepts_hooks());
        assert!(Phase::Finishing.accepts_hooks());
    }
}
