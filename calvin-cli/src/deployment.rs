//! Compiled deployment descriptions
//!
//! ```yaml
//! actors:
//!   src:
//!     actor_type: std.Counter
//!     args: { start: 1 }
//!   out:
//!     actor_type: io.Print
//! connections:
//!   src.integer: [out.token]
//! port_properties:
//!   out.token: { queue_length: 8 }
//! ```
//!
//! Out-ports are tagged `<actor>.<port>` unless a tag is given, so
//! ordered routings can name their peers the way the file does.

use anyhow::{anyhow, bail, Context, Result};
use calvin_core::port::PortProperties;
use calvin_core::store::PortOverrides;
use calvin_core::{ActorId, Direction, Runtime};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Deployment {
    pub actors: BTreeMap<String, ActorSpec>,
    #[serde(default)]
    pub connections: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub port_properties: BTreeMap<String, PortSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActorSpec {
    pub actor_type: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

/// Port properties, with a direction for ports named both ways
#[derive(Debug, Clone, Deserialize)]
pub struct PortSpec {
    #[serde(default)]
    pub direction: Option<Direction>,
    #[serde(flatten)]
    pub properties: PortProperties,
}

impl Deployment {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read deployment {:?}", path))?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse deployment")
    }

    /// Create every actor and connection on `runtime`
    ///
    /// Returns the id of each actor by deployment name.
    pub fn deploy(&self, runtime: &mut Runtime) -> Result<HashMap<String, ActorId>> {
        let mut ids = HashMap::new();
        for (name, spec) in &self.actors {
            let overrides = self.overrides_for(runtime, name, &spec.actor_type)?;
            let id = runtime
                .new_actor_with_ports(&spec.actor_type, name.as_str(), spec.args.clone(), overrides)
                .with_context(|| format!("Failed to create actor {}", name))?;
            ids.insert(name.clone(), id);
        }

        for (from, targets) in &self.connections {
            let (out_actor, out_port) = split_port_ref(from)?;
            let out_id = lookup(&ids, out_actor)?;
            for to in targets {
                let (in_actor, in_port) = split_port_ref(to)?;
                let in_id = lookup(&ids, in_actor)?;
                runtime
                    .connect(out_id, out_port, in_id, in_port)
                    .with_context(|| format!("Failed to connect {} -> {}", from, to))?;
            }
        }
        tracing::info!(
            actors = ids.len(),
            connections = self.connections.values().map(Vec::len).sum::<usize>(),
            "deployed"
        );
        Ok(ids)
    }

    fn overrides_for(&self, runtime: &Runtime, name: &str, actor_type: &str) -> Result<PortOverrides> {
        let info = runtime
            .store()
            .info(actor_type)
            .ok_or_else(|| anyhow!("Unknown actor type {} for actor {}", actor_type, name))?;

        let mut overrides = PortOverrides::new();
        for port in &info.outputs {
            overrides.insert(
                (port.clone(), Direction::Out),
                PortProperties {
                    tag: Some(format!("{}.{}", name, port)),
                    ..Default::default()
                },
            );
        }

        for (port_ref, spec) in &self.port_properties {
            let (actor, port) = split_port_ref(port_ref)?;
            if actor != name {
                continue;
            }
            let is_in = info.inputs.iter().any(|p| p == port);
            let is_out = info.outputs.iter().any(|p| p == port);
            let direction = match (spec.direction, is_in, is_out) {
                (Some(d), _, _) => d,
                (None, true, false) => Direction::In,
                (None, false, true) => Direction::Out,
                (None, true, true) => {
                    bail!("Port {} exists in both directions; set direction", port_ref)
                }
                (None, false, false) => bail!("Actor {} has no port {}", name, port),
            };
            let key = (port.to_string(), direction);
            let merged = match overrides.get(&key) {
                Some(base) => base.merged(&spec.properties),
                None => spec.properties.clone(),
            };
            overrides.insert(key, merged);
        }
        Ok(overrides)
    }
}

/// Split `actor.port`; actor names may contain dots, port names may not
fn split_port_ref(port_ref: &str) -> Result<(&str, &str)> {
    port_ref
        .rsplit_once('.')
        .filter(|(actor, port)| !actor.is_empty() && !port.is_empty())
        .ok_or_else(|| anyhow!("Expected <actor>.<port>, got {:?}", port_ref))
}

fn lookup<'a>(ids: &'a HashMap<String, ActorId>, name: &str) -> Result<&'a ActorId> {
    ids.get(name)
        .ok_or_else(|| anyhow!("Connection names unknown actor {}", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use calvin_core::RuntimeConfig;

    const ALTERNATE: &str = r#"
actors:
  a:
    actor_type: std.Counter
  b:
    actor_type: std.Counter
    args: { start: 10 }
  alt:
    actor_type: flow.Alternate
    args: { order: [b.integer, a.integer] }
connections:
  a.integer: [alt.token]
  b.integer: [alt.token]
port_properties:
  alt.token:
    queue_length: 2
"#;

    #[test]
    fn test_parse_and_deploy() {
        let deployment = Deployment::from_yaml_str(ALTERNATE).unwrap();
        assert_eq!(deployment.actors.len(), 3);

        let mut runtime = calvin_actors::standard_runtime(RuntimeConfig::default()).unwrap();
        let ids = deployment.deploy(&mut runtime).unwrap();
        let alt = runtime.actor(&ids["alt"]).unwrap();
        let port = alt.port("token", Direction::In).unwrap();
        assert_eq!(port.queue.capacity(), 2);
        assert_eq!(port.queue.kind().routing_name(), "collect-all-tagged");
        assert_eq!(port.endpoints.len(), 2);

        let a = runtime.actor(&ids["a"]).unwrap();
        assert_eq!(
            a.port("integer", Direction::Out).unwrap().writer_tag(),
            "a.integer"
        );
    }

    #[test]
    fn test_split_port_ref() {
        assert_eq!(split_port_ref("a.b.port").unwrap(), ("a.b", "port"));
        assert!(split_port_ref("noport").is_err());
        assert!(split_port_ref("a.").is_err());
    }

    #[test]
    fn test_unknown_actor_in_connection() {
        let deployment = Deployment::from_yaml_str(
            r#"
actors:
  a: { actor_type: std.Counter }
connections:
  a.integer: [ghost.token]
"#,
        )
        .unwrap();
        let mut runtime = calvin_actors::standard_runtime(RuntimeConfig::default()).unwrap();
        let err = deployment.deploy(&mut runtime).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }
}
