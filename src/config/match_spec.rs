//! Device match specs as used by `no-auto-default`, `ignore-carrier` and
//! `unmanaged-devices`.

use std::fmt;

use regex::Regex;

use super::ConfigError;

#[derive(Debug, Clone)]
enum Matcher {
    Any,
    InterfaceName(Regex),
    Mac(String),
}

/// One parsed match spec.
#[derive(Debug, Clone)]
pub struct MatchSpec {
    raw: String,
    except: bool,
    matcher: Matcher,
}

impl MatchSpec {
    /// Parse a single spec.
    ///
    /// Accepted forms are `*`, `interface-name:<glob>`, `mac:<address>` and any of
    /// those prefixed with `except:`. Unprefixed values are interface-name globs.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidMatchSpec` for empty values.
    pub fn parse(spec: &str) -> Result<Self, ConfigError> {
        let raw = spec.trim().to_string();
        let (except, body) = match raw.strip_prefix("except:") {
            Some(rest) => (true, rest),
            None => (false, raw.as_str()),
        };

        let invalid = |reason: &str| ConfigError::InvalidMatchSpec {
            spec: spec.to_string(),
            reason: reason.to_string(),
        };

        let matcher = if body == "*" {
            Matcher::Any
        } else if let Some(mac) = body.strip_prefix("mac:") {
            if mac.is_empty() {
                return Err(invalid("empty hardware address"));
            }
            Matcher::Mac(mac.to_ascii_lowercase())
        } else {
            let pattern = body.strip_prefix("interface-name:").unwrap_or(body);
            if pattern.is_empty() {
                return Err(invalid("empty interface name"));
            }
            Matcher::InterfaceName(glob_to_regex(pattern).map_err(|e| invalid(&e.to_string()))?)
        };

        Ok(Self {
            raw,
            except,
            matcher,
        })
    }

    fn matches_device(&self, iface: &str, hw_address: Option<&str>) -> bool {
        match &self.matcher {
            Matcher::Any => true,
            Matcher::InterfaceName(re) => re.is_match(iface),
            Matcher::Mac(mac) => hw_address.is_some_and(|addr| addr.eq_ignore_ascii_case(mac)),
        }
    }
}

impl PartialEq for MatchSpec {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for MatchSpec {}

impl fmt::Display for MatchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn glob_to_regex(glob: &str) -> Result<Regex, regex::Error> {
    let mut pattern = String::with_capacity(glob.len() + 2);
    pattern.push('^');
    for ch in glob.chars() {
        match ch {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');
    Regex::new(&pattern)
}

/// An ordered list of match specs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchSpecList {
    specs: Vec<MatchSpec>,
}

impl MatchSpecList {
    /// Parse every entry of a configuration list.
    ///
    /// # Errors
    /// Returns the first spec that fails to parse.
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Result<Self, ConfigError> {
        let specs = entries
            .iter()
            .map(|s| s.as_ref())
            .filter(|s| !s.trim().is_empty())
            .map(MatchSpec::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { specs })
    }

    /// A device matches when any positive spec matches and no `except:` spec does.
    pub fn matches(&self, iface: &str, hw_address: Option<&str>) -> bool {
        let mut matched = false;
        for spec in &self.specs {
            if spec.matches_device(iface, hw_address) {
                if spec.except {
                    return false;
                }
                matched = true;
            }
        }
        matched
    }

    /// Whether the list has no entries.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Raw spec strings, in order.
    pub fn to_strings(&self) -> Vec<String> {
        self.specs.iter().map(ToString::to_string).collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn list(specs: &[&str]) -> MatchSpecList {
        MatchSpecList::parse(specs).unwrap()
    }

    #[test]
    fn interface_name_globs() {
        let specs = list(&["interface-name:eth*", "wlan?"]);
        assert!(specs.matches("eth0", None));
        assert!(specs.matches("wlan1", None));
        assert!(!specs.matches("wlan10", None));
        assert!(!specs.matches("veth0", None));
    }

    #[test]
    fn mac_is_case_insensitive() {
        let specs = list(&["mac:AA:BB:CC:DD:EE:FF"]);
        assert!(specs.matches("eth0", Some("aa:bb:cc:dd:ee:ff")));
        assert!(!specs.matches("eth0", None));
    }

    #[test]
    fn except_vetoes_wildcard() {
        let specs = list(&["*", "except:interface-name:eth0"]);
        assert!(specs.matches("eth1", None));
        assert!(!specs.matches("eth0", None));
    }

    #[test]
    fn empty_list_matches_nothing() {
        assert!(!MatchSpecList::default().matches("eth0", None));
    }

    #[test]
    fn empty_values_are_rejected() {
        assert!(MatchSpec::parse("mac:").is_err());
        assert!(MatchSpec::parse("interface-name:").is_err());
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let specs = list(&["br.0"]);
        assert!(specs.matches("br.0", None));
        assert!(!specs.matches("brx0", None));
    }
}
