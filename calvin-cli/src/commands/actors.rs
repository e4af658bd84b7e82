//! List registered actor types.

use anyhow::Result;
use calvin_core::store::ActorTypeInfo;
use std::path::Path;

pub fn list_actors(config: Option<&Path>, json: bool) -> Result<()> {
    let runtime = super::standard_runtime(config)?;
    let types: Vec<&ActorTypeInfo> = runtime.store().types().collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&types)?);
        return Ok(());
    }

    for info in types {
        println!("{}", info.actor_type);
        println!("  inputs:   {}", join_or_dash(&info.inputs));
        println!("  outputs:  {}", join_or_dash(&info.outputs));
        println!("  actions:  {}", join_or_dash(&info.actions));
        if !info.requires.is_empty() {
            println!("  requires: {}", info.requires.join(", "));
        }
    }
    Ok(())
}

fn join_or_dash(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}
