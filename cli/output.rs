use anyhow::{Context, Result};
use colored::*;
use comfy_table::{Cell, CellAlignment, Color, ContentArrangement, Table, presets::UTF8_FULL};
use ctxscan_core::folder_tree::{FolderNode, FolderTree};
use ctxscan_core::sections::{display_path, extension_label};
use ctxscan_core::{AppError, ScanResult, human_size};
use std::fs::{self, File};
use std::io::{self, IsTerminal, Write};
use std::path::Path;

/// Colors used by the printers in this module. Passed in explicitly so that
/// output stays plain when color is unwanted.
#[derive(Debug, Clone, Copy)]
pub struct Theme {
    pub heading: Color,
    pub accent: Color,
    pub muted: Color,
    pub plain: bool,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            heading: Color::Green,
            accent: Color::Cyan,
            muted: Color::DarkGrey,
            plain: false,
        }
    }
}

impl Theme {
    /// Theme for non-interactive output: no colors in tables or headings.
    pub fn plain() -> Self {
        Self {
            plain: true,
            ..Self::default()
        }
    }

    /// Colored when stdout is a terminal, plain otherwise.
    pub fn for_stdout() -> Self {
        if io::stdout().is_terminal() {
            Self::default()
        } else {
            Self::plain()
        }
    }

    fn cell(&self, text: impl ToString, color: Color) -> Cell {
        let cell = Cell::new(text.to_string());
        if self.plain { cell } else { cell.fg(color) }
    }

    fn heading(&self, text: &str) -> String {
        if self.plain {
            text.to_string()
        } else {
            text.green().bold().underline().to_string()
        }
    }

    fn table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table
    }
}

pub fn write_to_file(path: &Path, content: &str) -> Result<()> {
    let write_error = |target: &Path, source: io::Error| AppError::FileWrite {
        path: target.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| write_error(parent, e))
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let mut file = File::create(path)
        .map_err(|e| write_error(path, e))
        .with_context(|| format!("Failed to create file {}", path.display()))?;
    file.write_all(content.as_bytes())
        .map_err(|e| write_error(path, e))
        .with_context(|| format!("Failed to write to file {}", path.display()))?;
    Ok(())
}

pub fn write_to_stdout(content: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(content.as_bytes())
        .map_err(AppError::Io)
        .context("Failed to write to stdout")?;
    if !content.ends_with('\n') {
        handle
            .write_all(b"\n")
            .map_err(AppError::Io)
            .context("Failed to write newline to stdout")?;
    }
    handle
        .flush()
        .map_err(AppError::Io)
        .context("Failed to flush stdout")?;
    Ok(())
}

pub fn print_scan_summary(result: &ScanResult, top: usize, show_excluded: bool, theme: &Theme) {
    println!();
    println!("{}", theme.heading(" Scan Summary "));
    let rows = [
        ("Root:", result.root.display().to_string()),
        ("Files:", result.total_files.to_string()),
        ("Directories:", result.total_directories.to_string()),
        (
            "Total Size:",
            format!("{} ({} bytes)", human_size(result.total_size), result.total_size),
        ),
        ("Total Lines:", result.total_lines.to_string()),
        ("Excluded:", result.excluded_files.to_string()),
        ("Duration:", format!("{} ms", result.scan_duration.as_millis())),
    ];
    for (label, value) in rows {
        if theme.plain {
            println!("{:<14} {}", label, value);
        } else {
            println!("{:<14} {}", label.green(), value.cyan());
        }
    }

    if result.total_files == 0 {
        let note = "(No files matched the scan rules)";
        if theme.plain {
            println!("\n{}", note);
        } else {
            println!("\n{}", note.yellow());
        }
        println!();
        return;
    }

    println!("\n{}", theme.heading(" Extensions "));
    let mut table = theme.table();
    table.set_header(vec![
        theme.cell("Extension", theme.heading),
        theme.cell("Files", theme.heading),
        theme.cell("Share", theme.heading),
    ]);
    for (extension, count) in result.top_extensions(top) {
        let share = count as f64 * 100.0 / result.total_files as f64;
        table.add_row(vec![
            theme.cell(extension_label(extension), theme.accent),
            theme
                .cell(count, theme.accent)
                .set_alignment(CellAlignment::Right),
            theme
                .cell(format!("{:.1}%", share), theme.muted)
                .set_alignment(CellAlignment::Right),
        ]);
    }
    println!("{table}");

    println!("\n{}", theme.heading(" Largest Files "));
    let mut table = theme.table();
    table.set_header(vec![
        theme.cell("Path", theme.heading),
        theme.cell("Size", theme.heading),
        theme.cell("Lines", theme.heading),
    ]);
    for file in &result.largest_files {
        table.add_row(vec![
            theme.cell(display_path(&file.relative_path), theme.accent),
            theme
                .cell(human_size(file.size), theme.muted)
                .set_alignment(CellAlignment::Right),
            theme
                .cell(file.lines, theme.accent)
                .set_alignment(CellAlignment::Right),
        ]);
    }
    println!("{table}");

    if show_excluded && !result.excluded.is_empty() {
        println!("\n{}", theme.heading(" Excluded Entries "));
        let mut table = theme.table();
        table.set_header(vec![
            theme.cell("Path", theme.heading),
            theme.cell("Reason", theme.heading),
        ]);
        for record in &result.excluded {
            table.add_row(vec![
                theme.cell(display_path(&record.relative_path), theme.accent),
                theme.cell(
                    record.exclusion_reason.as_deref().unwrap_or("excluded"),
                    theme.muted,
                ),
            ]);
        }
        println!("{table}");
    }
    println!();
}

/// One line per visible node, indented by depth.
pub fn render_tree(tree: &FolderTree, dirs_only: bool, theme: &Theme) -> String {
    let mut out = String::new();
    for id in tree.visible_nodes() {
        let Some(node) = tree.node(id) else { continue };
        if dirs_only && !node.is_dir {
            continue;
        }
        out.push_str(&tree_line(node, theme));
        out.push('\n');
    }
    out
}

fn tree_line(node: &FolderNode, theme: &Theme) -> String {
    let indent = "  ".repeat(node.level);
    let marker = match (node.is_dir, node.is_expanded()) {
        (true, true) => "▼ ",
        (true, false) => "▶ ",
        (false, _) => "  ",
    };
    let selected = if node.is_selected() { "* " } else { "" };
    let name = if node.is_dir {
        format!("{}/", node.name)
    } else {
        node.name.clone()
    };
    let details = if node.is_dir {
        format!(
            "{} files, {} dirs, {}",
            node.file_count,
            node.dir_count,
            human_size(node.size)
        )
    } else {
        human_size(node.size)
    };

    if theme.plain {
        format!("{}{}{}{} ({})", indent, marker, selected, name, details)
    } else {
        let name = if node.is_dir {
            name.blue().bold().to_string()
        } else {
            name
        };
        format!(
            "{}{}{}{} {}",
            indent,
            marker,
            selected,
            name,
            format!("({})", details).dimmed()
        )
    }
}
