//! Walks a parsed HCL [`hcl::Body`] into a [`vigil_rules::Graph`] (spec
//! §4.4a).
//!
//! The body is walked block-by-block rather than deserialized in one shot
//! through serde, for two reasons: a duplicate `service "x"` label must be
//! rejected (a `HashMap`-based deserialize would silently keep the last one),
//! and `depends_on` names the *reverse* edge of the one the Rule Graph
//! stores (spec §4.4: `Service::dependants` lists who depends on a service,
//! not what it depends on), which needs a second pass once every service
//! exists.

use std::collections::HashSet;
use std::time::Duration;

use hcl::structure::Block;
use vigil_core::{Action, ActionBinding, ActionKind, Operator, Rule, RuleKind, Service, ServiceKind, ServiceName, Threshold};
use vigil_rules::Graph;

use crate::error::ConfigError;
use crate::schema::{ActionDef, RuleDef, ServiceDef};

pub fn load(source: &str) -> Result<Graph, ConfigError> {
    let body = hcl::parse(source)?;
    let mut graph = Graph::new();
    let mut seen = HashSet::new();
    let mut pending_deps: Vec<(ServiceName, Vec<String>)> = Vec::new();

    for block in body.blocks().filter(|b| b.identifier() == "service") {
        let name = block
            .labels()
            .first()
            .map(|label| label.as_str().to_string())
            .unwrap_or_default();
        if !seen.insert(name.clone()) {
            return Err(ConfigError::DuplicateName(name));
        }

        let def: ServiceDef = hcl::from_body(block.body().clone())?;
        let kind = parse_service_kind(&name, &def.kind)?;
        let mut svc = Service::new(ServiceName::new(name.as_str()), kind);
        svc.path = def.path.or(def.pidfile);
        svc.start_command = def.start;
        svc.stop_command = def.stop;
        svc.restart_command = def.restart;
        svc.uid = def.uid;
        svc.gid = def.gid;

        for rule_block in block.body().blocks().filter(|b| b.identifier() == "rule") {
            svc.rules.push(parse_rule(&name, rule_block)?);
        }

        pending_deps.push((svc.name.clone(), def.depends_on.clone()));
        graph.insert(svc);
    }

    for (name, deps) in &pending_deps {
        for dep in deps {
            let dep_name = ServiceName::new(dep.as_str());
            let parent = graph.get_mut(&dep_name).ok_or_else(|| ConfigError::UnresolvedDependency {
                service: name.to_string(),
                dependency: dep.clone(),
            })?;
            parent.dependants.push(name.clone());
        }
    }

    Ok(graph)
}

fn parse_rule(service: &str, block: &Block) -> Result<Rule, ConfigError> {
    let def: RuleDef = hcl::from_body(block.body().clone())?;
    let kind = parse_rule_kind(service, &def.kind)?;
    let operator = parse_operator(service, &def.operator)?;
    let threshold = match (def.threshold, def.text) {
        (Some(n), _) => Threshold::Number(n),
        (None, Some(t)) => Threshold::Text(t),
        (None, None) => Threshold::None,
    };
    let mut rule = Rule::new(kind, operator, threshold);
    if def.invert {
        rule = rule.inverted();
    }

    let mut binding = ActionBinding::default();
    if let Some(then_block) = block.body().blocks().find(|b| b.identifier() == "then") {
        binding.failure = parse_action(service, then_block, def.cycles, def.count)?;
    }
    if let Some(otherwise_block) = block.body().blocks().find(|b| b.identifier() == "otherwise") {
        binding.success = parse_action(service, otherwise_block, None, None)?;
    }
    rule.binding = binding;
    Ok(rule)
}

fn parse_action(
    service: &str,
    block: &Block,
    cycles: Option<u32>,
    count: Option<u32>,
) -> Result<Action, ConfigError> {
    let def: ActionDef = hcl::from_body(block.body().clone())?;
    let kind = parse_action_kind(service, &def.kind)?;
    let mut action = Action::new(kind);
    if let Some(exec) = def.exec {
        action = action.with_command(exec);
    }
    if let Some(timeout) = def.timeout {
        action = action.with_timeout(Duration::from_secs(timeout));
    }
    action.repeat = def.repeat;
    if let (Some(cycles), Some(count)) = (cycles, count) {
        action = action.with_debounce(cycles, count);
    }
    Ok(action)
}

fn parse_service_kind(service: &str, raw: &str) -> Result<ServiceKind, ConfigError> {
    Ok(match raw {
        "system" => ServiceKind::System,
        "process" => ServiceKind::Process,
        "file" => ServiceKind::File,
        "directory" => ServiceKind::Directory,
        "fifo" => ServiceKind::Fifo,
        "filesystem" => ServiceKind::Filesystem,
        "network" => ServiceKind::Network,
        "host" => ServiceKind::Host,
        "program" => ServiceKind::Program,
        other => return Err(ConfigError::UnknownServiceKind(service.to_string(), other.to_string())),
    })
}

fn parse_rule_kind(service: &str, raw: &str) -> Result<RuleKind, ConfigError> {
    Ok(match raw {
        "port" => RuleKind::Port,
        "icmp" => RuleKind::Icmp,
        "permission" => RuleKind::Permission,
        "uid" => RuleKind::Uid,
        "gid" => RuleKind::Gid,
        "size" => RuleKind::Size,
        "content" => RuleKind::ContentMatch,
        "checksum" => RuleKind::Checksum,
        "timestamp" => RuleKind::Timestamp,
        "space" => RuleKind::FilesystemSpace,
        "inode" => RuleKind::FilesystemInodes,
        "cpu" => RuleKind::Cpu,
        "memory" => RuleKind::Memory,
        "uptime" => RuleKind::Uptime,
        "link_status" => RuleKind::LinkStatus,
        "link_speed" => RuleKind::LinkSpeed,
        "link_saturation" => RuleKind::LinkSaturation,
        "upload_bytes" => RuleKind::UploadBytes,
        "download_bytes" => RuleKind::DownloadBytes,
        "upload_packets" => RuleKind::UploadPackets,
        "download_packets" => RuleKind::DownloadPackets,
        "pid" => RuleKind::PidChanged,
        "ppid" => RuleKind::PpidChanged,
        "resource" => RuleKind::ProcessResource,
        "status" => RuleKind::ProgramExitStatus,
        "exist" => RuleKind::Exist,
        "instance" => RuleKind::Instance,
        "action" => RuleKind::Action,
        other => return Err(ConfigError::UnknownRuleKind { service: service.to_string(), kind: other.to_string() }),
    })
}

fn parse_operator(service: &str, raw: &str) -> Result<Operator, ConfigError> {
    Ok(match raw {
        "<" | "lt" => Operator::Lt,
        "<=" | "le" => Operator::Le,
        ">" | "gt" => Operator::Gt,
        ">=" | "ge" => Operator::Ge,
        "==" | "eq" => Operator::Eq,
        "!=" | "ne" => Operator::Ne,
        "changed" => Operator::Changed,
        other => return Err(ConfigError::UnknownOperator { service: service.to_string(), operator: other.to_string() }),
    })
}

fn parse_action_kind(service: &str, raw: &str) -> Result<ActionKind, ConfigError> {
    Ok(match raw {
        "ignore" => ActionKind::Ignore,
        "alert" => ActionKind::Alert,
        "restart" => ActionKind::Restart,
        "stop" => ActionKind::Stop,
        "exec" => ActionKind::Exec,
        "unmonitor" => ActionKind::Unmonitor,
        "start" => ActionKind::Start,
        "monitor" => ActionKind::Monitor,
        other => return Err(ConfigError::UnknownActionKind { service: service.to_string(), kind: other.to_string() }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_service_with_a_rule_and_dependency() {
        let src = r#"
            service "db" {
              kind = "process"
              path = "/var/run/db.pid"
              start = ["/usr/bin/db", "start"]

              rule {
                kind = "cpu"
                if = ">"
                threshold = 90
                cycles = 3
                count = 2

                then {
                  kind = "restart"
                }
              }
            }

            service "web" {
              kind = "process"
              depends_on = ["db"]
            }
        "#;
        let graph = load(src).unwrap();
        assert_eq!(graph.len(), 2);

        let db = graph.get(&ServiceName::new("db")).unwrap();
        assert_eq!(db.rules.len(), 1);
        assert_eq!(db.rules[0].kind, RuleKind::Cpu);
        assert_eq!(db.rules[0].binding.failure.kind, ActionKind::Restart);
        assert_eq!(db.dependants, vec![ServiceName::new("web")]);

        let web = graph.get(&ServiceName::new("web")).unwrap();
        assert!(web.dependants.is_empty());
    }

    #[test]
    fn duplicate_service_name_is_rejected() {
        let src = r#"
            service "db" { kind = "process" }
            service "db" { kind = "process" }
        "#;
        let err = load(src).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateName(name) if name == "db"));
    }

    #[test]
    fn unresolved_dependency_is_rejected() {
        let src = r#"
            service "web" {
              kind = "process"
              depends_on = ["ghost"]
            }
        "#;
        let err = load(src).unwrap_err();
        assert!(matches!(err, ConfigError::UnresolvedDependency { dependency, .. } if dependency == "ghost"));
    }

    #[test]
    fn unknown_rule_kind_is_rejected() {
        let src = r#"
            service "web" {
              kind = "process"
              rule {
                kind = "bogus"
                if = ">"
                threshold = 1
              }
            }
        "#;
        let err = load(src).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownRuleKind { kind, .. } if kind == "bogus"));
    }
}
