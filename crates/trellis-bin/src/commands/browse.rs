// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `browse` command.

use std::collections::HashSet;

use serde::Serialize;
use trellis_core::SubjectContext;
use trellis_opcua::{NodeId, NodeKind, Session, SyncResult, SynchronizationEngine};

use crate::cli::{BrowseArgs, Cli, OutputFormat};
use crate::demo::{self, DemoPlant};
use crate::error::{BinError, BinResult};
use crate::runtime::resolve_config;

/// One node of the printed tree.
#[derive(Debug, Serialize)]
pub struct BrowseEntry {
    /// Node id in `ns=..;s=..` form.
    pub node_id: String,
    /// Browse name without namespace.
    pub browse_name: String,
    /// Folder, Object or Variable.
    pub node_class: String,
    /// Current value of a variable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// `true` when the node was already printed through another reference.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub repeated: bool,
    /// Forward children.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<BrowseEntry>,
}

/// Builds the demo plant, mirrors it and prints the resulting tree.
pub async fn browse(cli: &Cli, args: BrowseArgs) -> BinResult<()> {
    let config = resolve_config(None, cli.config.as_deref())?;

    let context = SubjectContext::new();
    let plant = DemoPlant::build(&context)?;
    let engine =
        SynchronizationEngine::with_type_registry(config.server, context, demo::type_registry());
    engine.start(plant.root.clone()).await?;

    let result = collect_tree(&engine, &plant, &args);
    engine.shutdown().await;
    let tree = result?;

    match args.format {
        OutputFormat::Text => print!("{}", render_text(&tree)),
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&tree)
                .map_err(|e| BinError::runtime(format!("failed to encode tree: {e}")))?;
            println!("{json}");
        }
    }
    Ok(())
}

fn collect_tree(engine: &SynchronizationEngine, plant: &DemoPlant, args: &BrowseArgs) -> BinResult<BrowseEntry> {
    let start = match &args.node {
        Some(node) => node
            .parse::<NodeId>()
            .map_err(|e| BinError::config(format!("invalid node id '{node}': {e}")))?,
        None => engine
            .node_id_of(plant.root.id())
            .ok_or_else(|| BinError::runtime("root subject is not mirrored"))?,
    };
    let node = engine
        .address_space()
        .find(&start)
        .ok_or_else(|| BinError::config(format!("unknown node {start}")))?;

    let session = engine.open_session()?;
    let mut visited = HashSet::new();
    let tree = collect(
        &session,
        start,
        node.browse_name().name,
        node.kind(),
        args.depth,
        &mut visited,
    )?;
    Ok(tree)
}

/// Browses `node_id` recursively. Nodes reachable through several
/// references are expanded once.
pub fn collect(
    session: &Session,
    node_id: NodeId,
    browse_name: String,
    kind: NodeKind,
    depth: usize,
    visited: &mut HashSet<NodeId>,
) -> SyncResult<BrowseEntry> {
    let value = if kind.is_variable() {
        Some(session.read(&node_id)?.value.to_string())
    } else {
        None
    };
    let mut entry = BrowseEntry {
        node_id: node_id.to_string(),
        browse_name,
        node_class: kind.to_string(),
        value,
        repeated: false,
        children: Vec::new(),
    };

    if !visited.insert(node_id.clone()) {
        entry.repeated = true;
        return Ok(entry);
    }
    if depth == 0 {
        return Ok(entry);
    }
    for reference in session.browse(&node_id)? {
        entry.children.push(collect(
            session,
            reference.node_id,
            reference.browse_name.name,
            reference.node_class,
            depth - 1,
            visited,
        )?);
    }
    Ok(entry)
}

/// Renders the tree with two-space indentation.
pub fn render_text(tree: &BrowseEntry) -> String {
    let mut out = String::new();
    render_into(tree, 0, &mut out);
    out
}

fn render_into(entry: &BrowseEntry, indent: usize, out: &mut String) {
    out.push_str(&"  ".repeat(indent));
    out.push_str(&format!("{} [{}] {}", entry.browse_name, entry.node_class, entry.node_id));
    if let Some(value) = &entry.value {
        out.push_str(&format!(" = {value}"));
    }
    if entry.repeated {
        out.push_str(" (see above)");
    }
    out.push('\n');
    for child in &entry.children {
        render_into(child, indent + 1, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_config::ServerConfig;

    async fn started() -> (SynchronizationEngine, DemoPlant) {
        let context = SubjectContext::new();
        let plant = DemoPlant::build(&context).unwrap();
        let engine = SynchronizationEngine::with_type_registry(
            ServerConfig::default(),
            context,
            demo::type_registry(),
        );
        engine.start(plant.root.clone()).await.unwrap();
        (engine, plant)
    }

    fn args(node: Option<&str>, depth: usize) -> BrowseArgs {
        BrowseArgs {
            node: node.map(str::to_string),
            depth,
            format: OutputFormat::Text,
        }
    }

    #[tokio::test]
    async fn test_collect_demo_tree() {
        let (engine, plant) = started().await;
        let tree = collect_tree(&engine, &plant, &args(None, 16)).unwrap();

        assert_eq!(tree.browse_name, "Root");
        let lines = tree.children.iter().find(|c| c.browse_name == "Lines").unwrap();
        assert_eq!(lines.children.len(), 2);
        assert_eq!(lines.children[0].browse_name, "Lines[0]");

        let text = render_text(&tree);
        assert!(text.contains("Name [Variable] ns=2;s=Root.Name = Demo Plant"));
        // The supervisor is also listed among the operators.
        assert!(text.contains("(see above)"));
    }

    #[tokio::test]
    async fn test_collect_from_node_with_depth() {
        let (engine, plant) = started().await;
        let tree = collect_tree(&engine, &plant, &args(Some("ns=2;s=Root.Lines[1]"), 1)).unwrap();

        assert_eq!(tree.browse_name, "Lines[1]");
        let machines = tree.children.iter().find(|c| c.browse_name == "Machines").unwrap();
        assert!(machines.children.is_empty());
    }

    #[tokio::test]
    async fn test_collect_unknown_node() {
        let (engine, plant) = started().await;
        let err = collect_tree(&engine, &plant, &args(Some("ns=2;s=Nowhere"), 4)).unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }
}
