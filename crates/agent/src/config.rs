//! Config keys, deltas and the subsystems they drive.

use std::collections::BTreeMap;
use std::fmt;

use microcloud_unit::{ConfigMap, ConfigValue};

/// Deployment mode. Fixed once bootstrap has started.
pub const MODE: &str = "mode";

/// Whether `MicroCeph` is deployed.
pub const MICROCEPH: &str = "microceph";

/// Whether `MicroOVN` is deployed.
pub const MICROOVN: &str = "microovn";

/// Channel of the LXD snap.
pub const SNAP_CHANNEL_LXD: &str = "snap-channel-lxd";

/// Channel of the `MicroCloud` snap.
pub const SNAP_CHANNEL_MICROCLOUD: &str = "snap-channel-microcloud";

/// Channel of the `MicroCeph` snap.
pub const SNAP_CHANNEL_MICROCEPH: &str = "snap-channel-microceph";

/// Channel of the `MicroOVN` snap.
pub const SNAP_CHANNEL_MICROOVN: &str = "snap-channel-microovn";

/// Keys that may only change while the unit is uninitialized.
pub const IMMUTABLE_KEYS: &[&str] = &[MODE];

/// Channel used when a channel option is empty or unset.
pub const DEFAULT_CHANNEL: &str = "latest/stable";

/// Keys whose desired value differs from the applied one.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ConfigDelta(BTreeMap<String, ConfigValue>);

impl ConfigDelta {
    /// Whether nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of changed keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether `key` changed.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// The new value of `key`, if it changed.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.0.get(key)
    }

    /// Changed keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Changed keys with their new values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }
}

impl fmt::Display for ConfigDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&str> = self.keys().collect();
        f.write_str(&keys.join(", "))
    }
}

/// Computes the keys of `desired` that are absent from or differ in `applied`.
///
/// Keys only present in `applied` are ignored.
#[must_use]
pub fn compute_delta(desired: &ConfigMap, applied: &ConfigMap) -> ConfigDelta {
    ConfigDelta(
        desired
            .iter()
            .filter(|(key, value)| applied.get(key.as_str()) != Some(value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
    )
}

/// A snap managed by the agent. Ordered by install dependency.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Subsystem {
    /// LXD.
    Lxd,

    /// `MicroCloud` itself.
    MicroCloud,

    /// `MicroCeph`.
    MicroCeph,

    /// `MicroOVN`.
    MicroOvn,
}

impl Subsystem {
    /// Every subsystem, in install order.
    pub const ALL: [Self; 4] = [Self::Lxd, Self::MicroCloud, Self::MicroCeph, Self::MicroOvn];

    /// Name of the snap.
    #[must_use]
    pub const fn snap_name(self) -> &'static str {
        match self {
            Self::Lxd => "lxd",
            Self::MicroCloud => "microcloud",
            Self::MicroCeph => "microceph",
            Self::MicroOvn => "microovn",
        }
    }

    /// Name shown in status messages.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Lxd => "LXD",
            Self::MicroCloud => "Microcloud",
            Self::MicroCeph => "MicroCeph",
            Self::MicroOvn => "MicroOVN",
        }
    }

    /// Config key holding the snap channel.
    #[must_use]
    pub const fn channel_key(self) -> &'static str {
        match self {
            Self::Lxd => SNAP_CHANNEL_LXD,
            Self::MicroCloud => SNAP_CHANNEL_MICROCLOUD,
            Self::MicroCeph => SNAP_CHANNEL_MICROCEPH,
            Self::MicroOvn => SNAP_CHANNEL_MICROOVN,
        }
    }

    /// Config key enabling the subsystem, for optional subsystems.
    #[must_use]
    pub const fn toggle_key(self) -> Option<&'static str> {
        match self {
            Self::Lxd | Self::MicroCloud => None,
            Self::MicroCeph => Some(MICROCEPH),
            Self::MicroOvn => Some(MICROOVN),
        }
    }

    /// Every config key that feeds this subsystem's install.
    pub fn keys(self) -> impl Iterator<Item = &'static str> {
        self.toggle_key()
            .into_iter()
            .chain(std::iter::once(self.channel_key()))
    }

    /// The subsystem a key belongs to, if any.
    #[must_use]
    pub fn for_key(key: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|subsystem| subsystem.keys().any(|k| k == key))
    }

    /// Whether the subsystem should be installed under `config`.
    ///
    /// Optional subsystems are off unless their toggle is `true`.
    #[must_use]
    pub fn enabled(self, config: &ConfigMap) -> bool {
        self.toggle_key().is_none_or(|key| {
            config
                .get(key)
                .and_then(ConfigValue::as_bool)
                .unwrap_or(false)
        })
    }

    /// The channel to install from under `config`.
    #[must_use]
    pub fn channel(self, config: &ConfigMap) -> String {
        resolve_channel(config.get(self.channel_key()))
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Resolves a channel option, falling back to [`DEFAULT_CHANNEL`].
#[must_use]
pub fn resolve_channel(value: Option<&ConfigValue>) -> String {
    value
        .and_then(ConfigValue::as_str)
        .filter(|channel| !channel.is_empty())
        .unwrap_or(DEFAULT_CHANNEL)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    fn config(entries: &[(&str, ConfigValue)]) -> ConfigMap {
        entries
            .iter()
            .map(|(key, value)| ((*key).to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn test_delta_ignores_unchanged_and_removed_keys() {
        let applied = config(&[
            (MODE, "cluster".into()),
            (SNAP_CHANNEL_LXD, "5.21/stable".into()),
            ("retired-option", "x".into()),
        ]);
        let desired = config(&[
            (MODE, "cluster".into()),
            (SNAP_CHANNEL_LXD, "5.21/edge".into()),
            (MICROCEPH, true.into()),
        ]);

        let delta = compute_delta(&desired, &applied);

        assert_eq!(delta.len(), 2);
        assert_eq!(delta.get(SNAP_CHANNEL_LXD), Some(&ConfigValue::from("5.21/edge")));
        assert_eq!(delta.get(MICROCEPH), Some(&ConfigValue::from(true)));
        assert!(!delta.contains_key(MODE));
        assert_eq!(delta.to_string(), "microceph, snap-channel-lxd");
    }

    #[test]
    fn test_subsystem_keys() {
        assert_eq!(Subsystem::for_key(SNAP_CHANNEL_LXD), Some(Subsystem::Lxd));
        assert_eq!(Subsystem::for_key(MICROOVN), Some(Subsystem::MicroOvn));
        assert_eq!(
            Subsystem::for_key(SNAP_CHANNEL_MICROCEPH),
            Some(Subsystem::MicroCeph)
        );
        assert_eq!(Subsystem::for_key(MODE), None);
    }

    #[test]
    fn test_optional_subsystems_default_off() {
        let config = config(&[(MICROOVN, true.into())]);

        assert!(Subsystem::Lxd.enabled(&config));
        assert!(Subsystem::MicroOvn.enabled(&config));
        assert!(!Subsystem::MicroCeph.enabled(&config));
    }

    #[test]
    fn test_empty_channel_resolves_to_default() {
        let config = config(&[
            (SNAP_CHANNEL_LXD, "".into()),
            (SNAP_CHANNEL_MICROCLOUD, "2/edge".into()),
        ]);

        assert_eq!(Subsystem::Lxd.channel(&config), DEFAULT_CHANNEL);
        assert_eq!(Subsystem::MicroCloud.channel(&config), "2/edge");
        assert_eq!(Subsystem::MicroOvn.channel(&config), DEFAULT_CHANNEL);
    }

    fn arb_value() -> impl Strategy<Value = ConfigValue> {
        prop_oneof![
            any::<bool>().prop_map(ConfigValue::Bool),
            (0i64..4).prop_map(ConfigValue::Int),
            "[a-c]{0,2}".prop_map(ConfigValue::String),
        ]
    }

    fn arb_config() -> impl Strategy<Value = ConfigMap> {
        prop::collection::btree_map("[a-e]", arb_value(), 0..5)
    }

    proptest! {
        #[test]
        fn delta_is_exact(desired in arb_config(), applied in arb_config()) {
            let delta = compute_delta(&desired, &applied);

            for (key, value) in &desired {
                let changed = applied.get(key) != Some(value);
                prop_assert_eq!(delta.contains_key(key), changed);
            }
            for key in delta.keys() {
                prop_assert!(desired.contains_key(key));
            }
        }

        #[test]
        fn applying_delta_converges(desired in arb_config(), mut applied in arb_config()) {
            let delta = compute_delta(&desired, &applied);
            for (key, value) in delta.iter() {
                applied.insert(key.to_string(), value.clone());
            }

            prop_assert!(compute_delta(&desired, &applied).is_empty());
        }
    }
}
