//! Lazily expandable folder view with per-directory statistics.
//!
//! Nodes live in an arena and refer to each other by [`NodeId`]. Children are
//! owned by their parent's child list; the parent link is only used to walk
//! upwards. Collapsing a directory releases its whole subtree back to the
//! arena's free list.

use crate::config::ScanConfig;
use crate::error::{AppError, Result};
use crate::filter::{PathFilter, normalized_extension};
use crate::walker::{modified_time, relative_to, validate_root};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Expansion lifecycle: `Collapsed -> Expanding -> Expanded -> Collapsing -> Collapsed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Collapsed,
    Expanding,
    Expanded,
    Collapsing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortType {
    #[default]
    Name,
    Size,
    Modified,
    Extension,
}

impl FromStr for SortType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "name" => Ok(SortType::Name),
            "size" => Ok(SortType::Size),
            "modified" | "date" => Ok(SortType::Modified),
            "extension" | "type" => Ok(SortType::Extension),
            other => Err(AppError::InvalidArgument(format!(
                "Unknown sort type '{}'. Expected name, size, modified or extension.",
                other
            ))),
        }
    }
}

impl fmt::Display for SortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SortType::Name => "name",
            SortType::Size => "size",
            SortType::Modified => "modified",
            SortType::Extension => "extension",
        };
        f.write_str(name)
    }
}

/// Recursive statistics for one directory, honoring the exclusion rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderStats {
    pub total_files: usize,
    pub total_directories: usize,
    pub total_size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub file_types: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FolderNode {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
    /// File size, or the recursive content size for directories.
    pub size: u64,
    pub file_count: usize,
    pub dir_count: usize,
    pub modified: Option<DateTime<Utc>>,
    pub level: usize,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    state: NodeState,
    selected: bool,
}

impl FolderNode {
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn is_expanded(&self) -> bool {
        self.state == NodeState::Expanded
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }
}

#[derive(Debug)]
pub struct FolderTree {
    root_path: PathBuf,
    filter: PathFilter,
    follow_symlinks: bool,
    max_depth: usize,
    sort_type: SortType,
    nodes: Vec<Option<FolderNode>>,
    free: Vec<usize>,
    root: NodeId,
}

impl FolderTree {
    /// Builds the tree with the root expanded one level.
    pub fn new(root: impl Into<PathBuf>, config: ScanConfig) -> Result<Self> {
        let root_path = root.into();
        validate_root(&root_path)?;
        let filter = PathFilter::new(&config)?;

        let mut tree = Self {
            root_path,
            filter,
            follow_symlinks: config.follow_symlinks,
            max_depth: config.max_depth,
            sort_type: SortType::default(),
            nodes: Vec::new(),
            free: Vec::new(),
            root: NodeId(0),
        };
        tree.root = tree.alloc_root();
        tree.expand_node(tree.root)?;
        Ok(tree)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn sort_type(&self) -> SortType {
        self.sort_type
    }

    pub fn show_hidden(&self) -> bool {
        self.filter.include_hidden()
    }

    pub fn node(&self, id: NodeId) -> Option<&FolderNode> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    /// Number of live nodes in the arena.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Loads the immediate children of a directory node. Expanding a file or
    /// an already expanded node does nothing.
    pub fn expand_node(&mut self, id: NodeId) -> Result<()> {
        let node = self.node_or_err(id)?;
        if !node.is_dir || node.state != NodeState::Collapsed {
            return Ok(());
        }
        if self.max_depth > 0 && node.level >= self.max_depth {
            log::debug!("Not expanding {}: depth limit reached.", node.path.display());
            return Ok(());
        }
        let (path, level) = (node.path.clone(), node.level);

        self.set_state(id, NodeState::Expanding);
        let children = match self.load_children(&path, level + 1, id) {
            Ok(children) => children,
            Err(e) => {
                self.set_state(id, NodeState::Collapsed);
                return Err(e);
            }
        };
        if let Some(node) = self.node_mut(id) {
            node.children = children;
            node.state = NodeState::Expanded;
        }
        log::trace!("Expanded {}", path.display());
        Ok(())
    }

    /// Collapses a directory node and releases every descendant.
    pub fn collapse_node(&mut self, id: NodeId) {
        let children = match self.node_mut(id) {
            Some(node) if node.state == NodeState::Expanded => {
                node.state = NodeState::Collapsing;
                std::mem::take(&mut node.children)
            }
            _ => return,
        };
        for child in children {
            self.release_subtree(child);
        }
        self.set_state(id, NodeState::Collapsed);
    }

    /// Expands every directory on the way to `relative`, returning its node.
    pub fn expand_path(&mut self, relative: &Path) -> Result<NodeId> {
        let mut current = self.root;
        let mut walked = PathBuf::new();
        for component in relative.components() {
            walked.push(component);
            self.expand_node(current)?;
            let target = self.root_path.join(&walked);
            current = self
                .node_or_err(current)?
                .children
                .iter()
                .copied()
                .find(|child| self.node(*child).is_some_and(|n| n.path == target))
                .ok_or_else(|| {
                    AppError::InvalidArgument(format!(
                        "'{}' is not visible in the folder tree",
                        walked.display()
                    ))
                })?;
        }
        self.expand_node(current)?;
        Ok(current)
    }

    /// Pre-order list of the root and every node under an expanded parent.
    pub fn visible_nodes(&self) -> Vec<NodeId> {
        let mut visible = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.node(id) else { continue };
            visible.push(id);
            if node.state == NodeState::Expanded {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        visible
    }

    pub fn set_sort_type(&mut self, sort_type: SortType) -> Result<()> {
        self.sort_type = sort_type;
        self.refresh()
    }

    pub fn set_show_hidden(&mut self, show: bool) -> Result<()> {
        self.filter = self.filter.with_include_hidden(show);
        self.refresh()
    }

    /// Flips the selection flag and returns the new value.
    pub fn toggle_selected(&mut self, id: NodeId) -> Result<bool> {
        let node = self
            .node_mut(id)
            .ok_or_else(|| AppError::InvalidArgument(format!("unknown folder node {}", id)))?;
        node.selected = !node.selected;
        Ok(node.selected)
    }

    /// Paths of selected nodes that are currently loaded, sorted.
    pub fn selected_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .nodes
            .iter()
            .flatten()
            .filter(|n| n.selected)
            .map(|n| n.path.clone())
            .collect();
        paths.sort();
        paths
    }

    /// Walks `path` recursively under the tree's exclusion rules.
    pub fn folder_stats(&self, path: &Path) -> FolderStats {
        let mut stats = FolderStats::default();
        let walker = WalkDir::new(path)
            .min_depth(1)
            .follow_links(self.follow_symlinks)
            .into_iter()
            .filter_entry(|entry| {
                !self.filter.should_exclude(
                    &relative_to(&self.root_path, entry.path()),
                    entry.file_type().is_dir(),
                )
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::trace!("Skipping entry in folder stats: {}", e);
                    continue;
                }
            };
            let Ok(meta) = entry.metadata() else { continue };
            if entry.file_type().is_dir() {
                stats.total_directories += 1;
            } else {
                stats.total_files += 1;
                stats.total_size = stats.total_size.saturating_add(meta.len());
                *stats
                    .file_types
                    .entry(normalized_extension(entry.path()))
                    .or_insert(0) += 1;
            }
            let modified = modified_time(&meta);
            if modified > stats.last_modified {
                stats.last_modified = modified;
            }
        }
        stats
    }

    /// Rebuilds loaded nodes under the current settings, keeping expanded
    /// directories expanded and selections selected where they still exist.
    fn refresh(&mut self) -> Result<()> {
        let mut expanded = HashSet::new();
        let mut selected = HashSet::new();
        for node in self.nodes.iter().flatten() {
            if node.state == NodeState::Expanded {
                expanded.insert(node.path.clone());
            }
            if node.selected {
                selected.insert(node.path.clone());
            }
        }
        log::debug!(
            "Refreshing folder tree (sort: {}, hidden: {}).",
            self.sort_type,
            self.show_hidden()
        );

        self.nodes.clear();
        self.free.clear();
        self.root = self.alloc_root();

        let mut pending = vec![self.root];
        while let Some(id) = pending.pop() {
            let Some(node) = self.node(id) else { continue };
            if !expanded.contains(&node.path) {
                continue;
            }
            self.expand_node(id)?;
            if let Some(node) = self.node(id) {
                pending.extend(node.children.iter().copied());
            }
        }
        for node in self.nodes.iter_mut().flatten() {
            node.selected = selected.contains(&node.path);
        }
        Ok(())
    }

    fn load_children(&mut self, dir: &Path, level: usize, parent: NodeId) -> Result<Vec<NodeId>> {
        let entries = fs::read_dir(dir).map_err(|source| AppError::DirRead {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut loaded = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                    continue;
                }
            };
            let path = entry.path();
            let meta = if self.follow_symlinks {
                fs::metadata(&path)
            } else {
                fs::symlink_metadata(&path)
            };
            let meta = match meta {
                Ok(meta) => meta,
                Err(e) => {
                    log::warn!("Cannot stat {}: {}", path.display(), e);
                    continue;
                }
            };
            let is_dir = meta.is_dir();
            if self
                .filter
                .should_exclude(&relative_to(&self.root_path, &path), is_dir)
            {
                continue;
            }

            let mut node = FolderNode {
                name: entry.file_name().to_string_lossy().into_owned(),
                path,
                is_dir,
                size: meta.len(),
                file_count: 0,
                dir_count: 0,
                modified: modified_time(&meta),
                level,
                children: Vec::new(),
                parent: Some(parent),
                state: NodeState::Collapsed,
                selected: false,
            };
            if is_dir {
                let stats = self.folder_stats(&node.path);
                node.size = stats.total_size;
                node.file_count = stats.total_files;
                node.dir_count = stats.total_directories;
                node.modified = node.modified.max(stats.last_modified);
            }
            loaded.push(node);
        }

        let sort_type = self.sort_type;
        loaded.sort_by(|a, b| compare_nodes(a, b, sort_type));
        Ok(loaded.into_iter().map(|node| self.alloc(node)).collect())
    }

    fn alloc_root(&mut self) -> NodeId {
        let name = self
            .root_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.root_path.display().to_string());
        let stats = self.folder_stats(&self.root_path);
        let root_meta = fs::metadata(&self.root_path).ok();
        let node = FolderNode {
            name,
            path: self.root_path.clone(),
            is_dir: true,
            size: stats.total_size,
            file_count: stats.total_files,
            dir_count: stats.total_directories,
            modified: root_meta
                .as_ref()
                .and_then(modified_time)
                .max(stats.last_modified),
            level: 0,
            children: Vec::new(),
            parent: None,
            state: NodeState::Collapsed,
            selected: false,
        };
        self.alloc(node)
    }

    fn alloc(&mut self, node: FolderNode) -> NodeId {
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                NodeId(slot)
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        }
    }

    fn release_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(current.0).and_then(Option::take) {
                stack.extend(node.children);
                self.free.push(current.0);
            }
        }
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut FolderNode> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    fn node_or_err(&self, id: NodeId) -> Result<&FolderNode> {
        self.node(id)
            .ok_or_else(|| AppError::InvalidArgument(format!("unknown folder node {}", id)))
    }

    fn set_state(&mut self, id: NodeId, state: NodeState) {
        if let Some(node) = self.node_mut(id) {
            node.state = state;
        }
    }
}

/// Directories first, then the chosen key, then case-insensitive name.
fn compare_nodes(a: &FolderNode, b: &FolderNode, sort_type: SortType) -> Ordering {
    let by_kind = b.is_dir.cmp(&a.is_dir);
    let by_key = match sort_type {
        SortType::Name => Ordering::Equal,
        SortType::Size => b.size.cmp(&a.size),
        SortType::Modified => b.modified.cmp(&a.modified),
        SortType::Extension => {
            normalized_extension(Path::new(&a.name)).cmp(&normalized_extension(Path::new(&b.name)))
        }
    };
    by_kind
        .then(by_key)
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
}
