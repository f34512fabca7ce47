//! Named flows and the steps they are built from.

use crate::dialog::DialogId;
use cpi_core::cli::FlowChoice;
use std::fmt;

/// One wizard step. Each step renders exactly one dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StepKind {
    SerialConnect,
    Confirm,
    EraseAll,
    FlashBin,
    Bootloader,
    CopyUf2,
    Credentials,
    Settings,
    Success,
}

impl StepKind {
    pub fn dialog(&self) -> DialogId {
        match self {
            StepKind::SerialConnect => DialogId::SerialConnect,
            StepKind::Confirm => DialogId::Confirm,
            StepKind::EraseAll => DialogId::Erase,
            StepKind::FlashBin | StepKind::Bootloader => DialogId::Flash,
            StepKind::CopyUf2 => DialogId::CopyUf2,
            StepKind::Credentials => DialogId::Credentials,
            StepKind::Settings => DialogId::GenerateSettings,
            StepKind::Success => DialogId::Success,
        }
    }

    /// Steps that modify the device or the UF2 drive. These run once per
    /// flow attempt; re-entering them only re-renders.
    pub fn is_operation(&self) -> bool {
        matches!(
            self,
            StepKind::EraseAll
                | StepKind::FlashBin
                | StepKind::Bootloader
                | StepKind::CopyUf2
                | StepKind::Settings
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            StepKind::SerialConnect => "connect",
            StepKind::Confirm => "confirm",
            StepKind::EraseAll => "erase",
            StepKind::FlashBin => "flash-bin",
            StepKind::Bootloader => "bootloader",
            StepKind::CopyUf2 => "copy-uf2",
            StepKind::Credentials => "credentials",
            StepKind::Settings => "settings",
            StepKind::Success => "success",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowKind {
    BinProgram,
    Uf2Program,
    BootloaderOnly,
    SettingsOnly,
}

#[derive(Debug, PartialEq, Eq)]
pub struct FlowDefinition {
    pub kind: FlowKind,
    pub label: &'static str,
    pub steps: &'static [StepKind],
}

static BIN_PROGRAM: FlowDefinition = FlowDefinition {
    kind: FlowKind::BinProgram,
    label: "Install Bin File",
    steps: &[
        StepKind::SerialConnect,
        StepKind::Confirm,
        StepKind::EraseAll,
        StepKind::FlashBin,
        StepKind::Success,
    ],
};

static UF2_PROGRAM: FlowDefinition = FlowDefinition {
    kind: FlowKind::Uf2Program,
    label: "Install Bootloader and uf2",
    steps: &[
        StepKind::SerialConnect,
        StepKind::Confirm,
        StepKind::EraseAll,
        StepKind::Bootloader,
        StepKind::CopyUf2,
        StepKind::Credentials,
        StepKind::Settings,
        StepKind::Success,
    ],
};

static BOOTLOADER_ONLY: FlowDefinition = FlowDefinition {
    kind: FlowKind::BootloaderOnly,
    label: "Install Bootloader Only",
    steps: &[
        StepKind::SerialConnect,
        StepKind::Confirm,
        StepKind::EraseAll,
        StepKind::Bootloader,
        StepKind::Success,
    ],
};

static SETTINGS_ONLY: FlowDefinition = FlowDefinition {
    kind: FlowKind::SettingsOnly,
    label: "Update WiFi credentials",
    steps: &[
        StepKind::SerialConnect,
        StepKind::Credentials,
        StepKind::Settings,
        StepKind::Success,
    ],
};

impl FlowKind {
    pub fn all() -> &'static [FlowKind] {
        &[
            FlowKind::BinProgram,
            FlowKind::Uf2Program,
            FlowKind::BootloaderOnly,
            FlowKind::SettingsOnly,
        ]
    }

    pub fn definition(&self) -> &'static FlowDefinition {
        match self {
            FlowKind::BinProgram => &BIN_PROGRAM,
            FlowKind::Uf2Program => &UF2_PROGRAM,
            FlowKind::BootloaderOnly => &BOOTLOADER_ONLY,
            FlowKind::SettingsOnly => &SETTINGS_ONLY,
        }
    }

    pub fn label(&self) -> &'static str {
        self.definition().label
    }

    pub fn step_count(&self) -> usize {
        self.definition().steps.len()
    }

    pub fn step(&self, index: usize) -> Option<StepKind> {
        self.definition().steps.get(index).copied()
    }
}

impl From<FlowChoice> for FlowKind {
    fn from(choice: FlowChoice) -> Self {
        match choice {
            FlowChoice::Bin => FlowKind::BinProgram,
            FlowChoice::Uf2 => FlowKind::Uf2Program,
            FlowChoice::Bootloader => FlowKind::BootloaderOnly,
            FlowChoice::Settings => FlowKind::SettingsOnly,
        }
    }
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_flow_starts_at_connect_and_ends_at_success() {
        for flow in FlowKind::all() {
            let steps = flow.definition().steps;
            assert_eq!(steps.first(), Some(&StepKind::SerialConnect), "{}", flow);
            assert_eq!(steps.last(), Some(&StepKind::Success), "{}", flow);
            assert_eq!(flow.definition().kind, *flow);
        }
    }

    #[test]
    fn steps_appear_once_per_flow() {
        for flow in FlowKind::all() {
            let mut seen = std::collections::BTreeSet::new();
            for step in flow.definition().steps {
                assert!(seen.insert(*step), "{} repeats {}", flow, step);
            }
        }
    }

    #[test]
    fn cli_choices_map_to_flows() {
        assert_eq!(FlowKind::from(FlowChoice::Uf2), FlowKind::Uf2Program);
        assert_eq!(FlowKind::from(FlowChoice::Settings).step_count(), 4);
        assert_eq!(FlowKind::BinProgram.step(5), None);
    }
}
