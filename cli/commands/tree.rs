use anyhow::{Context, Result};
use ctxscan_core::{Config, FolderTree, NodeId, SortType};

use crate::cli_args::TreeArgs;
use crate::load_config_for_command;
use crate::output::{Theme, render_tree, write_to_stdout};

pub fn handle_tree_command(args: TreeArgs, _quiet: bool) -> Result<()> {
    let project_root = Config::determine_project_root(args.project_config.project_root.as_ref())
        .context("Failed to determine project root")?;

    let config = load_config_for_command(&project_root, &args.project_config, Some(&args.scan))
        .context("Failed to load configuration for tree command")?;
    let scan_config = config.to_scan_config(&project_root)?;

    let mut tree = FolderTree::new(&project_root, scan_config)
        .with_context(|| format!("Failed to read folder tree at {}", project_root.display()))?;
    let sort: SortType = args.sort.parse()?;
    if sort != tree.sort_type() {
        tree.set_sort_type(sort)?;
    }
    if args.show_hidden && !tree.show_hidden() {
        tree.set_show_hidden(true)?;
    }

    if let Some(depth) = args.depth {
        expand_to_depth(&mut tree, depth)?;
    }
    for path in &args.expand {
        tree.expand_path(path)
            .with_context(|| format!("Cannot expand '{}'", path.display()))?;
    }

    write_to_stdout(&render_tree(&tree, args.dirs_only, &Theme::for_stdout()))
}

/// Expands every directory whose level is below `depth`.
fn expand_to_depth(tree: &mut FolderTree, depth: usize) -> Result<()> {
    let mut pending: Vec<NodeId> = vec![tree.root()];
    while let Some(id) = pending.pop() {
        let Some(node) = tree.node(id) else { continue };
        if !node.is_dir || node.level >= depth {
            continue;
        }
        tree.expand_node(id)?;
        if let Some(node) = tree.node(id) {
            pending.extend(node.children().iter().copied());
        }
    }
    log::debug!("Tree expanded to depth {}.", depth);
    Ok(())
}
