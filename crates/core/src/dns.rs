//! DNS record model, validation, reconciliation planning and quorum checks.
//!
//! Local records are the source of truth. [`plan_sync`] compares them with
//! the provider's records and returns the additions, value updates and
//! removals that make the provider match.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Smallest explicit TTL accepted.
pub const MIN_TTL: i32 = 60;

/// Largest TTL accepted.
pub const MAX_TTL: i32 = 86_400;

/// Provider convention for "automatic" TTL.
pub const AUTO_TTL: i32 = 1;

/// Default TTL for new records.
pub const DEFAULT_TTL: i32 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    A,
    Aaaa,
    Cname,
    Mx,
    Txt,
    Ns,
    Srv,
    Caa,
}

impl RecordType {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Cname => "CNAME",
            RecordType::Mx => "MX",
            RecordType::Txt => "TXT",
            RecordType::Ns => "NS",
            RecordType::Srv => "SRV",
            RecordType::Caa => "CAA",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::Aaaa),
            "CNAME" => Ok(RecordType::Cname),
            "MX" => Ok(RecordType::Mx),
            "TXT" => Ok(RecordType::Txt),
            "NS" => Ok(RecordType::Ns),
            "SRV" => Ok(RecordType::Srv),
            "CAA" => Ok(RecordType::Caa),
            other => Err(CoreError::Validation(format!("Unsupported record type '{other}'"))),
        }
    }

    /// Whether values of this type are hostnames (compared case-insensitively).
    fn has_hostname_value(self) -> bool {
        matches!(self, RecordType::Cname | RecordType::Mx | RecordType::Ns)
    }

    pub fn requires_priority(self) -> bool {
        matches!(self, RecordType::Mx | RecordType::Srv)
    }
}

/// A single resource record with its name fully qualified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub record_type: RecordType,
    pub name: String,
    pub value: String,
    pub ttl: i32,
    pub priority: Option<i32>,
}

impl DnsRecord {
    /// Same `(type, name)` slot and same content.
    fn same_content(&self, other: &DnsRecord) -> bool {
        normalize_value(self.record_type, &self.value) == normalize_value(other.record_type, &other.value)
            && self.ttl == other.ttl
            && (!self.record_type.requires_priority() || self.priority == other.priority)
    }

    fn same_value(&self, other: &DnsRecord) -> bool {
        normalize_value(self.record_type, &self.value) == normalize_value(other.record_type, &other.value)
    }
}

/// A record as the provider stores it, with the provider's id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRecord {
    pub id: String,
    #[serde(flatten)]
    pub record: DnsRecord,
}

/// Qualify a record name relative to `zone` (`@` and `""` mean the apex).
pub fn qualify_name(name: &str, zone: &str) -> String {
    let zone = zone.trim().trim_end_matches('.').to_ascii_lowercase();
    let name = name.trim().trim_end_matches('.').to_ascii_lowercase();
    if name.is_empty() || name == "@" {
        zone
    } else if name == zone || name.ends_with(&format!(".{zone}")) {
        name
    } else {
        format!("{name}.{zone}")
    }
}

fn normalize_value(record_type: RecordType, value: &str) -> String {
    let value = value.trim();
    match record_type {
        _ if record_type.has_hostname_value() => value.trim_end_matches('.').to_ascii_lowercase(),
        RecordType::Txt => value.trim_matches('"').to_string(),
        RecordType::Aaaa => value
            .parse::<Ipv6Addr>()
            .map(|ip| ip.to_string())
            .unwrap_or_else(|_| value.to_ascii_lowercase()),
        _ => value.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn is_hostname(value: &str) -> bool {
    let v = value.trim_end_matches('.');
    !v.is_empty()
        && v.len() <= 253
        && v.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        })
}

/// Validate a record's value, TTL and priority for its type.
pub fn validate_record(record: &DnsRecord) -> Result<(), CoreError> {
    let value = record.value.trim();
    if value.is_empty() {
        return Err(CoreError::Validation("Record value is required".into()));
    }
    if record.ttl != AUTO_TTL && !(MIN_TTL..=MAX_TTL).contains(&record.ttl) {
        return Err(CoreError::Validation(format!(
            "TTL must be {AUTO_TTL} (automatic) or between {MIN_TTL} and {MAX_TTL}"
        )));
    }
    if record.record_type.requires_priority() {
        match record.priority {
            Some(p) if (0..=65_535).contains(&p) => {}
            _ => {
                return Err(CoreError::Validation(format!(
                    "{} records require a priority between 0 and 65535",
                    record.record_type.as_str()
                )))
            }
        }
    }

    let ok = match record.record_type {
        RecordType::A => value.parse::<Ipv4Addr>().is_ok(),
        RecordType::Aaaa => value.parse::<Ipv6Addr>().is_ok(),
        RecordType::Cname | RecordType::Mx | RecordType::Ns => is_hostname(value),
        // weight port target
        RecordType::Srv => {
            let parts: Vec<&str> = value.split_whitespace().collect();
            parts.len() == 3
                && parts[0].parse::<u16>().is_ok()
                && parts[1].parse::<u16>().is_ok()
                && is_hostname(parts[2])
        }
        // flags tag "value"
        RecordType::Caa => {
            let parts: Vec<&str> = value.splitn(3, ' ').collect();
            parts.len() == 3
                && parts[0].parse::<u8>().is_ok()
                && matches!(parts[1], "issue" | "issuewild" | "iodef")
        }
        RecordType::Txt => value.len() <= 4096,
    };

    if ok {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Invalid {} record value '{value}'",
            record.record_type.as_str()
        )))
    }
}

/// Starter records for a new zone pointing at `ipv4`.
pub fn common_records(zone: &str, ipv4: &str) -> Vec<DnsRecord> {
    let zone = qualify_name("@", zone);
    vec![
        DnsRecord {
            record_type: RecordType::A,
            name: zone.clone(),
            value: ipv4.to_string(),
            ttl: DEFAULT_TTL,
            priority: None,
        },
        DnsRecord {
            record_type: RecordType::Cname,
            name: format!("www.{zone}"),
            value: zone.clone(),
            ttl: DEFAULT_TTL,
            priority: None,
        },
        DnsRecord {
            record_type: RecordType::Mx,
            name: zone.clone(),
            value: format!("mail.{zone}"),
            ttl: DEFAULT_TTL,
            priority: Some(10),
        },
    ]
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// A provider record to overwrite with local content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordUpdate {
    pub id: String,
    pub from: DnsRecord,
    pub to: DnsRecord,
}

/// Changes needed to make the provider match local records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
    pub added: Vec<DnsRecord>,
    pub updated: Vec<RecordUpdate>,
    pub removed: Vec<ProviderRecord>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Compute the changes that make `remote` equal to `local`.
///
/// Records are grouped by `(type, name)`. Within a group, identical
/// records pair up first, then records with the same value but a different
/// TTL or priority, then remaining records pair in order as value updates.
/// Leftover local records are added and leftover provider records removed.
pub fn plan_sync(zone: &str, local: &[DnsRecord], remote: &[ProviderRecord]) -> SyncPlan {
    type Key = (RecordType, String);

    let mut local_groups: BTreeMap<Key, Vec<DnsRecord>> = BTreeMap::new();
    for r in local {
        let mut r = r.clone();
        r.name = qualify_name(&r.name, zone);
        local_groups.entry((r.record_type, r.name.clone())).or_default().push(r);
    }
    let mut remote_groups: BTreeMap<Key, Vec<ProviderRecord>> = BTreeMap::new();
    for r in remote {
        let mut r = r.clone();
        r.record.name = qualify_name(&r.record.name, zone);
        remote_groups
            .entry((r.record.record_type, r.record.name.clone()))
            .or_default()
            .push(r);
    }

    let mut plan = SyncPlan::default();
    let mut keys: Vec<Key> = local_groups.keys().cloned().collect();
    keys.extend(remote_groups.keys().cloned());
    keys.sort();
    keys.dedup();

    for key in keys {
        let mut locals = local_groups.remove(&key).unwrap_or_default();
        let mut remotes = remote_groups.remove(&key).unwrap_or_default();

        // Exact matches need nothing.
        locals.retain(|l| {
            match remotes.iter().position(|r| r.record.same_content(l)) {
                Some(idx) => {
                    remotes.remove(idx);
                    false
                }
                None => true,
            }
        });

        // Same value, different ttl/priority.
        let mut pending = Vec::new();
        for l in locals {
            match remotes.iter().position(|r| r.record.same_value(&l)) {
                Some(idx) => {
                    let r = remotes.remove(idx);
                    plan.updated.push(RecordUpdate { id: r.id, from: r.record, to: l });
                }
                None => pending.push(l),
            }
        }

        let mut remotes = remotes.into_iter();
        for l in pending {
            match remotes.next() {
                Some(r) => plan.updated.push(RecordUpdate { id: r.id, from: r.record, to: l }),
                None => plan.added.push(l),
            }
        }
        plan.removed.extend(remotes);
    }

    plan
}

// ---------------------------------------------------------------------------
// Propagation quorum
// ---------------------------------------------------------------------------

/// What one resolver answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolverAnswer {
    pub resolver: String,
    /// Answer values, or the lookup error.
    pub result: Result<Vec<String>, String>,
}

/// Outcome of a propagation check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropagationReport {
    pub propagated: bool,
    pub expected: Vec<String>,
    /// Resolvers whose answer contains every expected value.
    pub agreeing: usize,
    /// Resolvers that answered at all.
    pub responding: usize,
    pub total: usize,
    pub answers: Vec<ResolverAnswer>,
}

/// Declare propagation when a strict majority of responding resolvers
/// return every expected value.
pub fn evaluate_quorum(
    record_type: RecordType,
    expected: &[String],
    answers: Vec<ResolverAnswer>,
) -> PropagationReport {
    let wanted: Vec<String> = expected.iter().map(|v| normalize_value(record_type, v)).collect();

    let responding = answers.iter().filter(|a| a.result.is_ok()).count();
    let agreeing = answers
        .iter()
        .filter(|a| match &a.result {
            Ok(values) => {
                let got: Vec<String> = values.iter().map(|v| normalize_value(record_type, v)).collect();
                !wanted.is_empty() && wanted.iter().all(|w| got.contains(w))
            }
            Err(_) => false,
        })
        .count();

    PropagationReport {
        propagated: responding > 0 && agreeing * 2 > responding,
        expected: expected.to_vec(),
        agreeing,
        responding,
        total: answers.len(),
        answers,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(t: RecordType, name: &str, value: &str) -> DnsRecord {
        DnsRecord {
            record_type: t,
            name: name.into(),
            value: value.into(),
            ttl: 3600,
            priority: t.requires_priority().then_some(10),
        }
    }

    fn prov(id: &str, r: DnsRecord) -> ProviderRecord {
        ProviderRecord { id: id.into(), record: r }
    }

    /// Apply a plan to a provider record set, as a provider would.
    fn apply(remote: &mut Vec<ProviderRecord>, plan: &SyncPlan) {
        remote.retain(|r| !plan.removed.iter().any(|x| x.id == r.id));
        for u in &plan.updated {
            if let Some(r) = remote.iter_mut().find(|r| r.id == u.id) {
                r.record = u.to.clone();
            }
        }
        for (i, a) in plan.added.iter().enumerate() {
            remote.push(prov(&format!("new{i}"), a.clone()));
        }
    }

    #[test]
    fn differing_a_record_is_one_update() {
        let local = vec![rec(RecordType::A, "example.com", "1.2.3.4")];
        let mut remote = vec![prov("r1", rec(RecordType::A, "example.com", "5.6.7.8"))];
        let plan = plan_sync("example.com", &local, &remote);
        assert!(plan.added.is_empty());
        assert!(plan.removed.is_empty());
        assert_eq!(plan.updated.len(), 1);
        assert_eq!(plan.updated[0].id, "r1");
        assert_eq!(plan.updated[0].to.value, "1.2.3.4");

        apply(&mut remote, &plan);
        assert_eq!(remote[0].record.value, "1.2.3.4");
    }

    #[test]
    fn second_sync_is_empty() {
        let local = vec![
            rec(RecordType::A, "@", "1.2.3.4"),
            rec(RecordType::Cname, "www", "example.com"),
            rec(RecordType::Mx, "@", "mail.example.com"),
            rec(RecordType::Txt, "@", "v=spf1 mx -all"),
            rec(RecordType::Txt, "@", "google-site-verification=abc"),
        ];
        let mut remote = vec![
            prov("a", rec(RecordType::A, "example.com", "9.9.9.9")),
            prov("b", rec(RecordType::Txt, "example.com", "stale")),
            prov("c", rec(RecordType::Ns, "example.com", "ns1.example.net")),
        ];
        let first = plan_sync("example.com", &local, &remote);
        assert_eq!(first.added.len(), 3);
        assert_eq!(first.updated.len(), 2);
        assert_eq!(first.removed.len(), 1);
        assert_eq!(first.removed[0].id, "c");

        apply(&mut remote, &first);
        let second = plan_sync("example.com", &local, &remote);
        assert!(second.is_empty(), "{second:?}");
    }

    #[test]
    fn ttl_only_change_targets_matching_value() {
        let mut l1 = rec(RecordType::A, "example.com", "1.1.1.1");
        l1.ttl = 300;
        let l2 = rec(RecordType::A, "example.com", "2.2.2.2");
        let remote = vec![
            prov("x", rec(RecordType::A, "example.com", "2.2.2.2")),
            prov("y", rec(RecordType::A, "example.com", "1.1.1.1")),
        ];
        let plan = plan_sync("example.com", &[l1, l2], &remote);
        assert_eq!(plan.updated.len(), 1);
        assert_eq!(plan.updated[0].id, "y");
        assert_eq!(plan.updated[0].to.ttl, 300);
    }

    #[test]
    fn hostname_values_compare_case_insensitively() {
        let local = vec![rec(RecordType::Cname, "www.example.com", "Example.com.")];
        let remote = vec![prov("1", rec(RecordType::Cname, "WWW.example.com", "example.com"))];
        assert!(plan_sync("example.com", &local, &remote).is_empty());
    }

    #[test]
    fn names_are_qualified() {
        assert_eq!(qualify_name("@", "Example.com."), "example.com");
        assert_eq!(qualify_name("www", "example.com"), "www.example.com");
        assert_eq!(qualify_name("mail.example.com.", "example.com"), "mail.example.com");
    }

    #[test]
    fn record_validation() {
        assert!(validate_record(&rec(RecordType::A, "@", "10.0.0.1")).is_ok());
        assert!(validate_record(&rec(RecordType::A, "@", "300.0.0.1")).is_err());
        assert!(validate_record(&rec(RecordType::Aaaa, "@", "2001:db8::1")).is_ok());
        assert!(validate_record(&rec(RecordType::Cname, "www", "bad host")).is_err());
        assert!(validate_record(&rec(RecordType::Srv, "_sip._tcp", "5 5060 sip.example.com")).is_ok());
        assert!(validate_record(&rec(RecordType::Caa, "@", "0 issue \"letsencrypt.org\"")).is_ok());

        let mut mx = rec(RecordType::Mx, "@", "mail.example.com");
        mx.priority = None;
        assert!(validate_record(&mx).is_err());

        let mut short_ttl = rec(RecordType::A, "@", "10.0.0.1");
        short_ttl.ttl = 5;
        assert!(validate_record(&short_ttl).is_err());
        short_ttl.ttl = AUTO_TTL;
        assert!(validate_record(&short_ttl).is_ok());
    }

    #[test]
    fn common_records_are_valid() {
        let records = common_records("example.com", "203.0.113.10");
        assert_eq!(records.len(), 3);
        for r in &records {
            validate_record(r).unwrap();
        }
    }

    fn answer(name: &str, values: &[&str]) -> ResolverAnswer {
        ResolverAnswer {
            resolver: name.into(),
            result: Ok(values.iter().map(|v| v.to_string()).collect()),
        }
    }

    #[test]
    fn quorum_needs_strict_majority_of_responders() {
        let expected = vec!["1.2.3.4".to_string()];
        let report = evaluate_quorum(
            RecordType::A,
            &expected,
            vec![
                answer("cloudflare", &["1.2.3.4"]),
                answer("google", &["1.2.3.4"]),
                answer("quad9", &["5.6.7.8"]),
            ],
        );
        assert!(report.propagated);
        assert_eq!((report.agreeing, report.responding, report.total), (2, 3, 3));

        let split = evaluate_quorum(
            RecordType::A,
            &expected,
            vec![answer("a", &["1.2.3.4"]), answer("b", &["5.6.7.8"])],
        );
        assert!(!split.propagated);
    }

    #[test]
    fn failed_resolvers_do_not_count_as_responders() {
        let report = evaluate_quorum(
            RecordType::A,
            &["1.2.3.4".to_string()],
            vec![
                answer("a", &["1.2.3.4"]),
                ResolverAnswer { resolver: "b".into(), result: Err("timeout".into()) },
                ResolverAnswer { resolver: "c".into(), result: Err("timeout".into()) },
            ],
        );
        assert!(report.propagated);
        assert_eq!(report.responding, 1);

        let none = evaluate_quorum(
            RecordType::A,
            &["1.2.3.4".to_string()],
            vec![ResolverAnswer { resolver: "b".into(), result: Err("timeout".into()) }],
        );
        assert!(!none.propagated);
    }
}
