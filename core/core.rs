pub mod config;
pub mod context;
pub mod error;
pub mod filter;
pub mod folder_tree;
pub mod mapping;
pub mod output_formats;
pub mod progress;
pub mod scan_result;
pub mod sections;
pub mod selector;
pub mod walker;

pub use config::{Config, GenerateOptions, ScanConfig, get_builtin_excludes, parse_size};
pub use context::{ContextAssembler, ContextBundle, estimate_cost};
pub use error::{AppError, Result};
pub use filter::PathFilter;
pub use folder_tree::{FolderNode, FolderStats, FolderTree, NodeId, NodeState, SortType};
pub use output_formats::{OutputFormat, RenderOptions, render_bundle, render_markdown};
pub use progress::{CancelToken, Progress, ProgressDelivery, ScanPhase};
pub use scan_result::{FileRecord, ScanResult};
pub use sections::{ContextSection, SectionBuilder, human_size};
pub use selector::ContentSelector;
pub use walker::Scanner;
