//! Rule predicates (spec §3 "Rule").

use serde::{Deserialize, Serialize};

use crate::action::ActionBinding;
use crate::simple_display;

/// What a Rule tests. Only a subset of Monit's full rule-kind catalog is
/// wired to a real collector in this workspace (see `vigil-probes`); the
/// remainder are modeled here so the Rule Graph, debouncer, and event engine
/// are complete, even though their `sample()` collaborators are stubs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleKind {
    Port,
    Icmp,
    Permission,
    Uid,
    Gid,
    Size,
    ContentMatch,
    Checksum,
    Timestamp,
    FilesystemSpace,
    FilesystemInodes,
    Cpu,
    Memory,
    Uptime,
    LinkStatus,
    LinkSpeed,
    LinkSaturation,
    UploadBytes,
    DownloadBytes,
    UploadPackets,
    DownloadPackets,
    PidChanged,
    PpidChanged,
    ProcessResource,
    ProgramExitStatus,
    Exist,
    Instance,
    Action,
}

simple_display! {
    RuleKind {
        Port => "port",
        Icmp => "icmp",
        Permission => "permission",
        Uid => "uid",
        Gid => "gid",
        Size => "size",
        ContentMatch => "content",
        Checksum => "checksum",
        Timestamp => "timestamp",
        FilesystemSpace => "space",
        FilesystemInodes => "inode",
        Cpu => "cpu",
        Memory => "memory",
        Uptime => "uptime",
        LinkStatus => "link_status",
        LinkSpeed => "link_speed",
        LinkSaturation => "link_saturation",
        UploadBytes => "upload_bytes",
        DownloadBytes => "download_bytes",
        UploadPackets => "upload_packets",
        DownloadPackets => "download_packets",
        PidChanged => "pid",
        PpidChanged => "ppid",
        ProcessResource => "resource",
        ProgramExitStatus => "status",
        Exist => "exist",
        Instance => "instance",
        Action => "action",
    }
}

/// Comparison operators a Rule's threshold is checked with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    Changed,
}

simple_display! {
    Operator {
        Lt => "<",
        Le => "<=",
        Gt => ">",
        Ge => ">=",
        Eq => "==",
        Ne => "!=",
        Changed => "changed",
    }
}

impl Operator {
    /// Evaluate `observed <op> threshold`. `Changed` always reports true —
    /// callers detect "changed" by comparing observed-vs-previous before
    /// calling, not through this method.
    pub fn evaluate(self, observed: f64, threshold: f64) -> bool {
        match self {
            Operator::Lt => observed < threshold,
            Operator::Le => observed <= threshold,
            Operator::Gt => observed > threshold,
            Operator::Ge => observed >= threshold,
            Operator::Eq => (observed - threshold).abs() < f64::EPSILON,
            Operator::Ne => (observed - threshold).abs() >= f64::EPSILON,
            Operator::Changed => true,
        }
    }
}

/// A scalar or structured threshold value. Most rule kinds compare a single
/// `f64` (percentages, byte counts, seconds); content/checksum/permission
/// rules compare against a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Threshold {
    Number(f64),
    Text(String),
    None,
}

/// A predicate attached to a Service, evaluated every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub kind: RuleKind,
    pub operator: Operator,
    pub threshold: Threshold,
    pub invert: bool,
    pub binding: ActionBinding,
}

impl Rule {
    pub fn new(kind: RuleKind, operator: Operator, threshold: Threshold) -> Self {
        Self { kind, operator, threshold, invert: false, binding: ActionBinding::default() }
    }

    pub fn with_binding(mut self, binding: ActionBinding) -> Self {
        self.binding = binding;
        self
    }

    pub fn inverted(mut self) -> Self {
        self.invert = true;
        self
    }

    /// True if the numeric `observed` value satisfies this rule's predicate
    /// (i.e. the rule's condition holds, which for most rule kinds means the
    /// check *fails*). `invert` flips the result.
    pub fn numeric_matches(&self, observed: f64) -> bool {
        let threshold = match &self.threshold {
            Threshold::Number(n) => *n,
            _ => return false,
        };
        let matched = self.operator.evaluate(observed, threshold);
        matched != self.invert
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_evaluate_basic_cases() {
        assert!(Operator::Gt.evaluate(5.0, 3.0));
        assert!(!Operator::Gt.evaluate(2.0, 3.0));
        assert!(Operator::Le.evaluate(3.0, 3.0));
        assert!(Operator::Ne.evaluate(1.0, 2.0));
    }

    #[test]
    fn invert_flips_numeric_match() {
        let rule = Rule::new(RuleKind::Cpu, Operator::Gt, Threshold::Number(90.0));
        assert!(rule.numeric_matches(95.0));
        let inverted = rule.inverted();
        assert!(!inverted.numeric_matches(95.0));
    }
}
