//! Destination rewrite policy.
//!
//! Pure and deterministic: a decoded destination whose host ends in a
//! forbidden suffix is replaced with the configured fallback relay;
//! anything else passes through untouched. The default suffixes stop
//! proxy loops through the hosting platform's own domains.

use vless_core::defaults;
use vless_proto::Destination;

use crate::config::PolicyConfig;

#[derive(Debug, Clone)]
pub struct AddressPolicy {
    suffixes: Vec<String>,
    fallback: Destination,
}

impl AddressPolicy {
    pub fn new(suffixes: Vec<String>, fallback_host: String, fallback_port: u16) -> Self {
        Self {
            suffixes,
            fallback: Destination {
                host: fallback_host,
                port: fallback_port,
            },
        }
    }

    pub fn from_config(config: &PolicyConfig) -> Self {
        Self::new(
            config.forbidden_suffixes.clone(),
            config.fallback_host.clone(),
            config.fallback_port,
        )
    }

    /// Map a decoded destination to the one actually dialed.
    pub fn resolve(&self, dest: Destination) -> Destination {
        if self
            .suffixes
            .iter()
            .any(|suffix| dest.host.ends_with(suffix.as_str()))
        {
            self.fallback.clone()
        } else {
            dest
        }
    }
}

impl Default for AddressPolicy {
    fn default() -> Self {
        Self::new(
            defaults::DEFAULT_FORBIDDEN_SUFFIXES
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
            defaults::DEFAULT_FALLBACK_HOST.to_owned(),
            defaults::DEFAULT_FALLBACK_PORT,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dest(host: &str, port: u16) -> Destination {
        Destination {
            host: host.to_owned(),
            port,
        }
    }

    #[test]
    fn forbidden_suffix_rewritten_to_fallback() {
        let policy = AddressPolicy::default();
        let out = policy.resolve(dest("foo.pages.dev", 443));
        assert_eq!(out, dest("1.1.1.1", 80));
        let out = policy.resolve(dest("bar.workers.dev", 8443));
        assert_eq!(out, dest("1.1.1.1", 80));
    }

    #[test]
    fn other_hosts_pass_through() {
        let policy = AddressPolicy::default();
        let out = policy.resolve(dest("example.com", 443));
        assert_eq!(out, dest("example.com", 443));
        // Suffix must match the end, not just appear somewhere.
        let out = policy.resolve(dest("pages.dev.example.com", 443));
        assert_eq!(out, dest("pages.dev.example.com", 443));
    }

    #[test]
    fn custom_suffixes_and_fallback() {
        let policy = AddressPolicy::new(
            vec![".internal".to_owned()],
            "10.0.0.1".to_owned(),
            8080,
        );
        assert_eq!(
            policy.resolve(dest("db.internal", 5432)),
            dest("10.0.0.1", 8080)
        );
        assert_eq!(
            policy.resolve(dest("foo.pages.dev", 443)),
            dest("foo.pages.dev", 443)
        );
    }
}
