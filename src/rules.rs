//! Component G — Rules Parser & Matcher.
//!
//! Parses the line-oriented `/etc/cgrules.conf` grammar (spec §4.G) into
//! an ordered rule list, resolves `(uid, gid)` to a destination cgroup,
//! and drives [`crate::attach::attach`] to place a pid accordingly.

use std::fmt;

use crate::error::{Kind, Result};

/// Default bound on the number of comma-separated controllers a single
/// rule line may name, matching [`crate::context::Config::max_mnt_elements`].
pub const DEFAULT_MAX_MNT_ELEMENTS: usize = 8;

/// Who a rule applies to, resolved at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    User { uid: u32 },
    Group { gid: u32, members: Vec<String> },
    Wildcard,
}

/// One parsed rule. Continuation lines (`%` subjects in the source) are
/// nested under the rule they continue, rather than kept as a flat
/// previous-line lookback in the parser (spec §9 Design Notes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub subject: Subject,
    pub controllers: Vec<String>,
    pub destination: String,
    pub continuations: Vec<Rule>,
}

impl Rule {
    fn matches(&self, uid: u32, gid: u32, resolver: &dyn NameResolver) -> bool {
        match &self.subject {
            Subject::Wildcard => true,
            Subject::User { uid: rule_uid } => *rule_uid == uid,
            Subject::Group {
                gid: rule_gid,
                members,
            } => {
                if *rule_gid == gid {
                    return true;
                }
                match resolver.username_for_uid(uid) {
                    Some(name) => members.iter().any(|m| *m == name),
                    None => false,
                }
            }
        }
    }
}

/// Expands a rule's controller set, turning a bare `*` into every
/// currently mounted controller.
pub fn expand_controllers(rule: &Rule, mounted: &[String]) -> Vec<String> {
    if rule.controllers.len() == 1 && rule.controllers[0] == "*" {
        mounted.to_vec()
    } else {
        rule.controllers.clone()
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RuleList {
    pub rules: Vec<Rule>,
}

impl RuleList {
    /// Walks the rule list in order and returns the first rule whose
    /// subject matches `(uid, gid)`. Wildcard always matches.
    pub fn resolve(&self, uid: u32, gid: u32, resolver: &dyn NameResolver) -> Option<&Rule> {
        self.rules.iter().find(|r| r.matches(uid, gid, resolver))
    }
}

impl fmt::Display for RuleList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rule in &self.rules {
            write_rule(f, rule, false)?;
            for cont in &rule.continuations {
                write_rule(f, cont, true)?;
            }
        }
        Ok(())
    }
}

fn write_rule(f: &mut fmt::Formatter<'_>, rule: &Rule, continuation: bool) -> fmt::Result {
    let subject = if continuation {
        "%".to_owned()
    } else {
        match &rule.subject {
            Subject::Wildcard => "*".to_owned(),
            Subject::User { uid } => uid.to_string(),
            Subject::Group { gid, .. } => format!("@{gid}"),
        }
    };
    writeln!(
        f,
        "{}\t{}\t{}",
        subject,
        rule.controllers.join(","),
        rule.destination
    )
}

/// Looks up user and group names the way `/etc/passwd` and `/etc/group`
/// would; abstracted so tests don't depend on the real system databases.
pub trait NameResolver {
    fn uid_for_user(&self, name: &str) -> Option<u32>;
    fn gid_for_group(&self, name: &str) -> Option<(u32, Vec<String>)>;
    fn username_for_uid(&self, uid: u32) -> Option<String>;
}

/// Resolves names through the host's NSS-backed passwd/group databases.
pub struct OsResolver;

impl NameResolver for OsResolver {
    fn uid_for_user(&self, name: &str) -> Option<u32> {
        nix::unistd::User::from_name(name)
            .ok()
            .flatten()
            .map(|u| u.uid.as_raw())
    }

    fn gid_for_group(&self, name: &str) -> Option<(u32, Vec<String>)> {
        nix::unistd::Group::from_name(name)
            .ok()
            .flatten()
            .map(|g| (g.gid.as_raw(), g.mem))
    }

    fn username_for_uid(&self, uid: u32) -> Option<String> {
        nix::unistd::User::from_uid(nix::unistd::Uid::from_raw(uid))
            .ok()
            .flatten()
            .map(|u| u.name)
    }
}

/// Parses the full configuration into a rule list, replacing any
/// previous one (cache mode, spec §4.G).
pub fn parse_cache(text: &str, resolver: &dyn NameResolver) -> Result<RuleList> {
    parse_cache_with_limit(text, resolver, DEFAULT_MAX_MNT_ELEMENTS)
}

pub fn parse_cache_with_limit(
    text: &str,
    resolver: &dyn NameResolver,
    max_mnt_elements: usize,
) -> Result<RuleList> {
    Ok(RuleList {
        rules: parse_lines(text, resolver, max_mnt_elements)?,
    })
}

/// Outcome of a lookup-mode parse: either the first matching rule (and
/// its continuations) or confirmation that the whole file was scanned
/// with no match.
pub enum LookupOutcome {
    Matched(Rule),
    NoMatch,
}

/// Parses until the first rule whose subject matches `(uid, gid)`,
/// consumes its continuation lines, then stops (spec §4.G lookup mode).
pub fn parse_lookup(
    text: &str,
    resolver: &dyn NameResolver,
    uid: u32,
    gid: u32,
    max_mnt_elements: usize,
) -> Result<LookupOutcome> {
    let rules = parse_lines(text, resolver, max_mnt_elements)?;
    match rules.into_iter().find(|r| r.matches(uid, gid, resolver)) {
        Some(rule) => Ok(LookupOutcome::Matched(rule)),
        None => Ok(LookupOutcome::NoMatch),
    }
}

fn parse_controllers(field: &str, max_mnt_elements: usize) -> Result<Vec<String>> {
    let controllers: Vec<String> = field.split(',').map(str::to_owned).collect();
    if controllers.len() > max_mnt_elements {
        return Err(Kind::ParseFailed.into());
    }
    Ok(controllers)
}

fn resolve_subject(field: &str, resolver: &dyn NameResolver) -> Option<Subject> {
    if field == "*" {
        return Some(Subject::Wildcard);
    }
    if let Some(group_name) = field.strip_prefix('@') {
        let (gid, members) = resolver.gid_for_group(group_name)?;
        return Some(Subject::Group { gid, members });
    }
    let uid = resolver.uid_for_user(field)?;
    Some(Subject::User { uid })
}

fn parse_lines(text: &str, resolver: &dyn NameResolver, max_mnt_elements: usize) -> Result<Vec<Rule>> {
    let mut top_level: Vec<Rule> = Vec::new();
    let mut last_top_index: Option<usize> = None;
    let mut last_skipped = false;

    for (lineno, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 3 {
            tracing::warn!(line = lineno + 1, %line, "malformed rule line");
            return Err(Kind::ParseFailed.into());
        }
        let (subject_field, controllers_field, destination_field) = (fields[0], fields[1], fields[2]);

        let is_continuation = subject_field == "%";

        if is_continuation {
            if last_skipped || last_top_index.is_none() {
                tracing::warn!(line = lineno + 1, "continuation of a skipped rule, skipping");
                last_skipped = true;
                continue;
            }
            let controllers = parse_controllers(controllers_field, max_mnt_elements)?;
            let parent = &mut top_level[last_top_index.unwrap()];
            let subject = parent.subject.clone();
            parent.continuations.push(Rule {
                subject,
                controllers,
                destination: destination_field.to_owned(),
                continuations: Vec::new(),
            });
            continue;
        }

        let subject = match resolve_subject(subject_field, resolver) {
            Some(s) => s,
            None => {
                tracing::warn!(
                    line = lineno + 1,
                    subject = subject_field,
                    "could not resolve rule subject, skipping"
                );
                last_skipped = true;
                last_top_index = None;
                continue;
            }
        };

        let controllers = parse_controllers(controllers_field, max_mnt_elements)?;

        top_level.push(Rule {
            subject,
            controllers,
            destination: destination_field.to_owned(),
            continuations: Vec::new(),
        });
        last_top_index = Some(top_level.len() - 1);
        last_skipped = false;
    }

    Ok(top_level)
}

/// Bitflags mirroring `change_cgroup`'s `flags` parameter (spec §4.G).
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeCgroupFlags {
    pub use_cache: bool,
}

pub use crate::attach::change_cgroup;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeResolver {
        users: HashMap<&'static str, u32>,
        groups: HashMap<&'static str, (u32, Vec<String>)>,
        names: HashMap<u32, &'static str>,
    }

    impl NameResolver for FakeResolver {
        fn uid_for_user(&self, name: &str) -> Option<u32> {
            self.users.get(name).copied()
        }
        fn gid_for_group(&self, name: &str) -> Option<(u32, Vec<String>)> {
            self.groups.get(name).cloned()
        }
        fn username_for_uid(&self, uid: u32) -> Option<String> {
            self.names.get(&uid).map(|s| s.to_string())
        }
    }

    fn resolver() -> FakeResolver {
        let mut users = HashMap::new();
        users.insert("alice", 1001);
        let mut groups = HashMap::new();
        groups.insert("faculty", (2000, vec!["bob".to_string()]));
        let mut names = HashMap::new();
        names.insert(1001, "alice");
        names.insert(9999, "eve");
        FakeResolver {
            users,
            groups,
            names,
        }
    }

    #[test]
    fn parses_user_group_and_wildcard_rules() {
        let text = "alice   cpu,cpuacct   students/alice\n\
                     @faculty *            faculty\n\
                     *       cpu           default\n";
        let list = parse_cache(text, &resolver()).unwrap();
        assert_eq!(list.rules.len(), 3);

        let r = list.resolve(1001, 1001, &resolver()).unwrap();
        assert_eq!(r.destination, "students/alice");

        let r = list.resolve(9999, 9999, &resolver()).unwrap();
        assert_eq!(r.destination, "default");
    }

    #[test]
    fn continuation_inherits_subject() {
        let text = "alice   cpu    aliceg\n%       memory aliceg\n";
        let list = parse_cache(text, &resolver()).unwrap();
        assert_eq!(list.rules.len(), 1);
        assert_eq!(list.rules[0].continuations.len(), 1);
        assert_eq!(list.rules[0].continuations[0].subject, list.rules[0].subject);
    }

    #[test]
    fn unresolvable_subject_skips_rule_and_its_continuations() {
        let text = "unknownuser cpu group1\n\
                     %           memory group1\n\
                     alice       cpu    aliceg\n";
        let list = parse_cache(text, &resolver()).unwrap();
        assert_eq!(list.rules.len(), 1);
        assert_eq!(list.rules[0].destination, "aliceg");
    }

    #[test]
    fn too_many_controllers_is_a_parse_error() {
        let text = "alice a,b,c,d,e,f,g,h,i dest\n";
        let err = parse_cache(text, &resolver()).unwrap_err();
        assert_eq!(err.kind(), Some(Kind::ParseFailed));
    }

    #[test]
    fn caller_supplied_limit_overrides_the_default() {
        let text = "alice a,b,c dest\n";
        // Under the default limit this parses fine...
        parse_cache(text, &resolver()).unwrap();
        // ...but a caller-supplied tighter limit must actually apply.
        let err = parse_cache_with_limit(text, &resolver(), 2).unwrap_err();
        assert_eq!(err.kind(), Some(Kind::ParseFailed));
    }

    #[test]
    fn lookup_mode_stops_at_first_match() {
        let text = "alice   cpu,cpuacct   students/alice\n\
                     @faculty *            faculty\n\
                     *       cpu           default\n";
        match parse_lookup(text, &resolver(), 1001, 1001, DEFAULT_MAX_MNT_ELEMENTS).unwrap() {
            LookupOutcome::Matched(rule) => assert_eq!(rule.destination, "students/alice"),
            LookupOutcome::NoMatch => panic!("expected a match"),
        }
    }

    #[test]
    fn print_then_reparse_round_trips() {
        let text = "alice   cpu,cpuacct   students/alice\n\
                     *       cpu           default\n";
        let list = parse_cache(text, &resolver()).unwrap();
        let printed = list.to_string();
        let reparsed = parse_cache(&printed, &resolver()).unwrap();
        assert_eq!(list, reparsed);
    }
}
