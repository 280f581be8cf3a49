//!
//! Network mode resolution
//!
//! Mirrors the container runtime's reserved network names: `default`, `bridge`,
//! `host`, `none` and `container:<id>` select a special mode and can't be
//! attached to by name, anything else is a user defined network.
use std::collections::BTreeMap;

/// Classification of a requested network name
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkMode<'a> {
    /// No network requested
    Unset,
    /// The runtime's default network
    Default,
    Bridge,
    Host,
    None,
    /// Share the network stack of another container
    Container(&'a str),
    /// A named network the instance is attached to
    UserDefined(&'a str),
}

impl<'a> NetworkMode<'a> {
    /// Classify a network name
    #[must_use]
    pub fn classify(name: &'a str) -> Self {
        match name {
            "" => Self::Unset,
            "default" => Self::Default,
            "bridge" => Self::Bridge,
            "host" => Self::Host,
            "none" => Self::None,
            _ => match name.split_once(':') {
                Some(("container", id)) => Self::Container(id),
                _ => Self::UserDefined(name),
            },
        }
    }

    #[must_use]
    pub const fn is_user_defined(&self) -> bool {
        matches!(self, Self::UserDefined(_))
    }
}

/// Networks to attach and the mode string sent to the core
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NetworkAttachment {
    /// Network name to IP, the IP is left empty for the core to fill in
    pub networks: BTreeMap<String, String>,
    /// The requested network name, passed through as is
    pub mode: String,
}

/// Resolve a requested network name into an attachment
#[must_use]
pub fn resolve(name: &str) -> NetworkAttachment {
    let networks = match NetworkMode::classify(name) {
        NetworkMode::UserDefined(network) => {
            BTreeMap::from([(network.to_string(), String::new())])
        }
        mode => {
            tracing::debug!("network {:?} is not user defined, attaching nothing", mode);
            BTreeMap::new()
        }
    };

    NetworkAttachment {
        networks,
        mode: name.to_string(),
    }
}
