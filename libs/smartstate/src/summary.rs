//! What a scan shows on the VM details page.

use std::fmt;

use serde::Serialize;

use crate::appliance::{Appliance, Target};
use crate::SmartStateError;

/// A summary entry, addressed by section and label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum SummaryField {
    OperatingSystem,
    Users,
    Groups,
    Patches,
    Packages,
    InitProcesses,
    Applications,
    Win32Services,
    KernelDrivers,
    FileSystemDrivers,
    Files,
    DriftHistory,
}

impl SummaryField {
    pub fn section(&self) -> &'static str {
        match self {
            Self::OperatingSystem => "Properties",
            Self::Users | Self::Groups | Self::Patches => "Security",
            Self::Packages
            | Self::InitProcesses
            | Self::Applications
            | Self::Win32Services
            | Self::KernelDrivers
            | Self::FileSystemDrivers
            | Self::Files => "Configuration",
            Self::DriftHistory => "Relationships",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::OperatingSystem => "Operating System",
            Self::Users => "Users",
            Self::Groups => "Groups",
            Self::Patches => "Patches",
            Self::Packages => "Packages",
            Self::InitProcesses => "Init Processes",
            Self::Applications => "Applications",
            Self::Win32Services => "Win32 Services",
            Self::KernelDrivers => "Kernel Drivers",
            Self::FileSystemDrivers => "File System Drivers",
            Self::Files => "Files",
            Self::DriftHistory => "Drift History",
        }
    }

    /// Fields a Windows scan must populate.
    pub const WINDOWS_COUNTS: [SummaryField; 5] = [
        Self::Patches,
        Self::Applications,
        Self::Win32Services,
        Self::KernelDrivers,
        Self::FileSystemDrivers,
    ];
}

impl fmt::Display for SummaryField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.section(), self.label())
    }
}

/// Summary values read after a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub operating_system: String,
    pub quadicon_os: String,
    pub last_analyzed: String,
    pub users: String,
    pub groups: String,

    /// `Packages` and `Init Processes` (Unix guests only).
    pub packages: Option<String>,
    pub services: Option<String>,

    /// Windows-only counts, in [`SummaryField::WINDOWS_COUNTS`] order.
    pub windows: Vec<(SummaryField, String)>,
}

impl ScanSummary {
    /// Read the summary values; Windows guests have a different set of
    /// counts.
    pub async fn read<A>(appliance: &A, target: &Target, windows: bool) -> Result<Self, SmartStateError>
    where
        A: Appliance + ?Sized,
    {
        let mut summary = Self {
            operating_system: appliance
                .summary_text(target, SummaryField::OperatingSystem)
                .await?,
            quadicon_os: appliance.quadicon_os(target).await?,
            last_analyzed: appliance.last_analyzed(target).await?,
            users: appliance.summary_text(target, SummaryField::Users).await?,
            groups: appliance.summary_text(target, SummaryField::Groups).await?,
            packages: None,
            services: None,
            windows: Vec::new(),
        };

        if windows {
            for field in SummaryField::WINDOWS_COUNTS {
                let value = appliance.summary_text(target, field).await?;
                summary.windows.push((field, value));
            }
        } else {
            summary.packages = Some(appliance.summary_text(target, SummaryField::Packages).await?);
            summary.services = Some(
                appliance
                    .summary_text(target, SummaryField::InitProcesses)
                    .await?,
            );
        }
        Ok(summary)
    }

    /// True if the target was never analysed.
    pub fn never_analyzed(&self) -> bool {
        self.last_analyzed == "Never"
    }
}
