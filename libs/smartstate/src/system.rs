//! Guest operating systems the checks know how to inspect.

use std::fmt;

/// A Unix-like guest and the commands that count its facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnixFlavor {
    /// Short key (`rhel`, `ubuntu`, ...).
    pub key: &'static str,

    /// Text identifying the flavor in `/etc/os-release`.
    pub id: &'static str,

    pub release_file: &'static str,

    /// OS type as the product reports it.
    pub os_type: &'static str,

    /// Package installed by the packages check, or expected to be present
    /// when the flavor has no install command.
    pub package: &'static str,

    /// Install command template; `{}` is replaced with the package name.
    pub install_command: Option<&'static str>,

    pub package_count_command: &'static str,
    pub service_count_command: &'static str,
}

impl UnixFlavor {
    /// The install command for the flavor's test package.
    pub fn install_package_command(&self) -> Option<String> {
        self.install_command
            .map(|template| template.replace("{}", self.package))
    }

    /// The OS name as it appears in the VM details view. The product spells
    /// `redhat` as `red hat` there.
    pub fn details_os_name(&self) -> &'static str {
        match self.os_type {
            "redhat" => "red hat",
            other => other,
        }
    }
}

const RPM_SERVICES: &str = concat!(
    "echo $((`ls -lL /etc/init.d | egrep -i -v \"readme|total\" | wc -l` + ",
    "`ls -l /usr/lib/systemd/system | grep service | wc -l` + ",
    "`ls -l /usr/lib/systemd/user | grep service | wc -l`))"
);

const CENTOS_SERVICES: &str = concat!(
    "echo $((`ls -lL /etc/init.d | egrep -i -v \"readme|total\" | wc -l` + ",
    "`ls -l /usr/lib/systemd/system | grep service | grep -v network1 | wc -l` + ",
    "`ls -l /usr/lib/systemd/user | grep service | wc -l` + ",
    "`ls -l /etc/systemd/system | grep -E \"*.service$\" | wc -l`))"
);

const DEB_SERVICES: &str = concat!(
    "echo $((`ls -alL /etc/init.d | egrep -iv \"readme|total|drwx\" | wc -l` + ",
    "`ls -alL /etc/systemd/system/ | grep service | wc -l`))"
);

const RPM_PACKAGES: &str = "rpm -qa | wc -l";
const DEB_PACKAGES: &str = "dpkg --get-selections | wc -l";
const APT_INSTALL: &str = "env DEBIAN_FRONTEND=noninteractive apt-get -y install {}";

/// Known Unix flavors, in detection order.
pub const UNIX_FLAVORS: &[UnixFlavor] = &[
    UnixFlavor {
        key: "rhel",
        id: "Red Hat",
        release_file: "/etc/redhat-release",
        os_type: "redhat",
        package: "kernel",
        install_command: None,
        package_count_command: RPM_PACKAGES,
        service_count_command: RPM_SERVICES,
    },
    UnixFlavor {
        key: "centos",
        id: "CentOS",
        release_file: "/etc/centos-release",
        os_type: "centos",
        package: "iso-codes",
        install_command: Some("yum install -y {}"),
        package_count_command: RPM_PACKAGES,
        service_count_command: CENTOS_SERVICES,
    },
    UnixFlavor {
        key: "fedora",
        id: "Fedora",
        release_file: "/etc/fedora-release",
        os_type: "fedora",
        package: "iso-codes",
        install_command: Some("dnf install -y {}"),
        package_count_command: RPM_PACKAGES,
        service_count_command: RPM_SERVICES,
    },
    UnixFlavor {
        key: "suse",
        id: "Suse",
        release_file: "/etc/SuSE-release",
        os_type: "suse",
        package: "iso-codes",
        install_command: Some("zypper install -y {}"),
        package_count_command: RPM_PACKAGES,
        service_count_command: RPM_SERVICES,
    },
    UnixFlavor {
        key: "ubuntu",
        id: "Ubuntu 14.04",
        release_file: "/etc/issue.net",
        os_type: "ubuntu",
        package: "iso-codes",
        install_command: Some(APT_INSTALL),
        package_count_command: DEB_PACKAGES,
        service_count_command: DEB_SERVICES,
    },
    UnixFlavor {
        key: "debian",
        id: "Debian ",
        release_file: "/etc/issue.net",
        os_type: "debian",
        package: "iso-codes",
        install_command: Some(APT_INSTALL),
        package_count_command: DEB_PACKAGES,
        service_count_command: DEB_SERVICES,
    },
];

/// Look up a flavor by key.
pub fn flavor(key: &str) -> Option<&'static UnixFlavor> {
    UNIX_FLAVORS.iter().find(|f| f.key == key)
}

/// Filesystem types that mean the guest is Windows and has no SSH.
pub const WINDOWS_FS_TYPES: &[&str] = &["ntfs", "fat32"];

/// The guest system a check runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemType {
    Windows,
    Unix(&'static UnixFlavor),
}

impl SystemType {
    pub fn is_windows(&self) -> bool {
        matches!(self, Self::Windows)
    }

    /// The Unix flavor, if any.
    pub fn flavor(&self) -> Option<&'static UnixFlavor> {
        match self {
            Self::Windows => None,
            Self::Unix(flavor) => Some(flavor),
        }
    }

    /// OS type as shown on the VM's quadicon.
    pub fn os_type(&self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::Unix(flavor) => flavor.os_type,
        }
    }

    /// OS name as shown in the VM details view.
    pub fn details_os_name(&self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::Unix(flavor) => flavor.details_os_name(),
        }
    }
}

impl fmt::Display for SystemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Windows => f.write_str("Red Hat Enterprise Windows"),
            Self::Unix(flavor) => f.write_str(flavor.key),
        }
    }
}

/// Identify the Unix flavor from the contents of `/etc/os-release`.
///
/// Matching is case-insensitive on the flavor's id; the first flavor in
/// [`UNIX_FLAVORS`] order wins.
pub fn detect_system_type(os_release: &str) -> Option<SystemType> {
    let haystack = os_release.to_lowercase();
    UNIX_FLAVORS
        .iter()
        .find(|f| haystack.contains(&f.id.to_lowercase()))
        .map(SystemType::Unix)
}
