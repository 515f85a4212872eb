use crate::catalog::{FileCatalog, FileKind, FileRecord};
use std::collections::{BTreeMap, HashSet};

/// Aggregated selection of a node, derived from the records below it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStatus {
    Checked,
    Unchecked,
    Partial,
}

impl SelectionStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            SelectionStatus::Checked => "[x]",
            SelectionStatus::Unchecked => "[ ]",
            SelectionStatus::Partial => "[~]",
        }
    }
}

/// A node of the directory tree. Directories are synthesized on every build;
/// file nodes borrow their record from the catalog.
#[derive(Debug)]
pub enum TreeNode<'a> {
    File(&'a FileRecord),
    Directory {
        name: String,
        path: String,
        children: Vec<TreeNode<'a>>,
    },
}

impl<'a> TreeNode<'a> {
    pub fn name(&self) -> &str {
        match self {
            TreeNode::File(r) => r.name(),
            TreeNode::Directory { name, .. } => name,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            TreeNode::File(r) => &r.path,
            TreeNode::Directory { path, .. } => path,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, TreeNode::Directory { .. })
    }

    pub fn children(&self) -> &[TreeNode<'a>] {
        match self {
            TreeNode::File(_) => &[],
            TreeNode::Directory { children, .. } => children,
        }
    }
}

#[derive(Default)]
struct DirBuilder<'a> {
    dirs: BTreeMap<String, DirBuilder<'a>>,
    files: BTreeMap<String, &'a FileRecord>,
}

impl<'a> DirBuilder<'a> {
    fn insert(&mut self, segments: &[&str], record: &'a FileRecord) {
        match segments {
            [] => {}
            [name] => {
                self.files.insert((*name).to_string(), record);
            }
            [dir, rest @ ..] => self
                .dirs
                .entry((*dir).to_string())
                .or_default()
                .insert(rest, record),
        }
    }

    fn into_nodes(self, prefix: &str) -> Vec<TreeNode<'a>> {
        let mut nodes = Vec::with_capacity(self.dirs.len() + self.files.len());
        for (name, dir) in self.dirs {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", prefix, name)
            };
            let children = dir.into_nodes(&path);
            nodes.push(TreeNode::Directory {
                name,
                path,
                children,
            });
        }
        nodes.extend(self.files.into_values().map(TreeNode::File));
        nodes
    }
}

/// Group a flat record list into root nodes.
/// Directories come before files; each group is sorted by name.
/// Filtering happens on the input list, so a directory only exists if at
/// least one record below it was passed in.
pub fn build<'a, I>(records: I) -> Vec<TreeNode<'a>>
where
    I: IntoIterator<Item = &'a FileRecord>,
{
    let mut root = DirBuilder::default();
    for record in records {
        let segments: Vec<&str> = record.path.split('/').filter(|s| !s.is_empty()).collect();
        root.insert(&segments, record);
    }
    root.into_nodes("")
}

/// Tri-state status of a node.
///
/// Only text records take part: a directory is checked when all of its text
/// descendants are selected, unchecked when none are (or it has none), and
/// partial otherwise.
pub fn status(node: &TreeNode) -> SelectionStatus {
    match node {
        TreeNode::File(r) => {
            if r.selected {
                SelectionStatus::Checked
            } else {
                SelectionStatus::Unchecked
            }
        }
        TreeNode::Directory { .. } => {
            let (mut selected, mut total) = (0usize, 0usize);
            count_text(node, &mut selected, &mut total);
            if selected == 0 {
                SelectionStatus::Unchecked
            } else if selected == total {
                SelectionStatus::Checked
            } else {
                SelectionStatus::Partial
            }
        }
    }
}

fn count_text(node: &TreeNode, selected: &mut usize, total: &mut usize) {
    match node {
        TreeNode::File(r) => {
            if r.is_text() {
                *total += 1;
                if r.selected {
                    *selected += 1;
                }
            }
        }
        TreeNode::Directory { children, .. } => {
            for child in children {
                count_text(child, selected, total);
            }
        }
    }
}

/// Paths of every text record at or below `node`
pub fn text_descendants(node: &TreeNode) -> Vec<String> {
    let mut out = Vec::new();
    collect_text(node, &mut out);
    out
}

fn collect_text(node: &TreeNode, out: &mut Vec<String>) {
    match node {
        TreeNode::File(r) => {
            if r.is_text() {
                out.push(r.path.clone());
            }
        }
        TreeNode::Directory { children, .. } => {
            for child in children {
                collect_text(child, out);
            }
        }
    }
}

/// A bulk selection change computed from the tree, applied to the catalog
/// once the tree's borrow has ended.
#[derive(Debug, Clone, PartialEq)]
pub struct Toggle {
    pub paths: Vec<String>,
    pub select: bool,
}

/// Clicking a node: a fully checked node deselects all its text records,
/// anything else selects them all.
pub fn plan_toggle(node: &TreeNode) -> Toggle {
    Toggle {
        paths: text_descendants(node),
        select: status(node) != SelectionStatus::Checked,
    }
}

/// Find the node at `path` by walking its segments from the roots
pub fn find<'t, 'a>(roots: &'t [TreeNode<'a>], path: &str) -> Option<&'t TreeNode<'a>> {
    let mut level = roots;
    let mut found = None;
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        let node = level.iter().find(|n| n.name() == segment)?;
        level = node.children();
        found = Some(node);
    }
    found
}

/// Toggle the node at `path` over the records accepted by `visible`.
/// Returns how many records changed.
pub fn toggle_path<F>(catalog: &mut FileCatalog, path: &str, visible: F) -> usize
where
    F: Fn(&FileRecord) -> bool,
{
    let plan = {
        let roots = build(catalog.records().iter().filter(|r| visible(*r)));
        find(&roots, path).map(plan_toggle)
    };
    match plan {
        Some(t) => catalog.set_selection(&t.paths, t.select),
        None => 0,
    }
}

/// One visible line of the tree view
#[derive(Debug, Clone, PartialEq)]
pub struct TreeRow {
    pub depth: usize,
    pub path: String,
    pub name: String,
    pub is_dir: bool,
    pub expanded: bool,
    pub status: SelectionStatus,
    /// None for directories
    pub kind: Option<FileKind>,
    pub line_count: usize,
}

/// Depth-first rows for display; children of collapsed directories are hidden.
pub fn flatten(roots: &[TreeNode], expanded: &HashSet<String>) -> Vec<TreeRow> {
    let mut rows = Vec::new();
    for node in roots {
        flatten_into(node, 0, expanded, &mut rows);
    }
    rows
}

fn flatten_into(node: &TreeNode, depth: usize, expanded: &HashSet<String>, rows: &mut Vec<TreeRow>) {
    match node {
        TreeNode::File(r) => rows.push(TreeRow {
            depth,
            path: r.path.clone(),
            name: r.name().to_string(),
            is_dir: false,
            expanded: false,
            status: status(node),
            kind: Some(r.kind),
            line_count: r.line_count,
        }),
        TreeNode::Directory {
            name,
            path,
            children,
        } => {
            let is_open = expanded.contains(path);
            let mut line_count = 0;
            sum_lines(node, &mut line_count);
            rows.push(TreeRow {
                depth,
                path: path.clone(),
                name: name.clone(),
                is_dir: true,
                expanded: is_open,
                status: status(node),
                kind: None,
                line_count,
            });
            if is_open {
                for child in children {
                    flatten_into(child, depth + 1, expanded, rows);
                }
            }
        }
    }
}

fn sum_lines(node: &TreeNode, acc: &mut usize) {
    match node {
        TreeNode::File(r) => *acc += r.line_count,
        TreeNode::Directory { children, .. } => {
            for child in children {
                sum_lines(child, acc);
            }
        }
    }
}

/// Every directory path in the tree, for expand-all
pub fn directory_paths(roots: &[TreeNode]) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack: Vec<&TreeNode> = roots.iter().collect();
    while let Some(node) = stack.pop() {
        if let TreeNode::Directory { path, children, .. } = node {
            out.push(path.clone());
            stack.extend(children.iter());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(path: &str, selected: bool) -> FileRecord {
        let mut r = FileRecord::text(path, "x\n");
        r.selected = selected;
        r
    }

    fn scenario() -> FileCatalog {
        FileCatalog::new(vec![
            rec("a/x.ts", true),
            rec("a/y.ts", false),
            rec("b/z.ts", true),
        ])
    }

    #[test]
    fn build_groups_by_directory_dirs_first() {
        let catalog = FileCatalog::new(vec![
            rec("README.md", false),
            rec("src/main.rs", false),
            rec("src/app/mod.rs", false),
            rec("Cargo.toml", false),
        ]);
        let roots = build(catalog.records());
        let names: Vec<&str> = roots.iter().map(|n| n.name()).collect();
        assert_eq!(names, vec!["src", "Cargo.toml", "README.md"]);

        let src = &roots[0];
        let child_names: Vec<&str> = src.children().iter().map(|n| n.name()).collect();
        assert_eq!(child_names, vec!["app", "main.rs"]);
        assert_eq!(src.children()[0].path(), "src/app");
    }

    #[test]
    fn every_record_reachable_by_its_path() {
        let catalog = FileCatalog::new(vec![
            rec("a/b/c/d.rs", false),
            rec("a/b/e.rs", false),
            rec("f.rs", false),
        ]);
        let roots = build(catalog.records());
        for r in catalog.records() {
            let node = find(&roots, &r.path).expect("leaf present");
            assert!(!node.is_dir());
            assert_eq!(node.path(), r.path);
        }
    }

    #[test]
    fn directory_status_tracks_descendants() {
        let catalog = scenario();
        let roots = build(catalog.records());
        assert_eq!(status(find(&roots, "a").unwrap()), SelectionStatus::Partial);
        assert_eq!(status(find(&roots, "b").unwrap()), SelectionStatus::Checked);

        let none = FileCatalog::new(vec![rec("c/q.rs", false), rec("c/d/r.rs", false)]);
        let roots = build(none.records());
        assert_eq!(status(find(&roots, "c").unwrap()), SelectionStatus::Unchecked);
    }

    #[test]
    fn status_matches_descendant_flags_for_all_combinations() {
        let paths = ["d/a.rs", "d/e/b.rs", "d/e/c.rs"];
        for mask in 0..8u8 {
            let records: Vec<FileRecord> = paths
                .iter()
                .enumerate()
                .map(|(i, p)| rec(p, mask & (1 << i) != 0))
                .collect();
            let catalog = FileCatalog::new(records);
            let roots = build(catalog.records());
            let expected = match mask.count_ones() {
                0 => SelectionStatus::Unchecked,
                3 => SelectionStatus::Checked,
                _ => SelectionStatus::Partial,
            };
            assert_eq!(status(find(&roots, "d").unwrap()), expected, "mask {mask:03b}");
        }
    }

    #[test]
    fn binary_records_do_not_block_checked() {
        let catalog = FileCatalog::new(vec![
            rec("assets/readme.md", true),
            FileRecord::without_content("assets/logo.png", FileKind::Binary, 10),
        ]);
        let roots = build(catalog.records());
        assert_eq!(status(find(&roots, "assets").unwrap()), SelectionStatus::Checked);
    }

    #[test]
    fn toggling_partial_directory_selects_all() {
        let mut catalog = scenario();
        let changed = toggle_path(&mut catalog, "a", |_| true);
        assert_eq!(changed, 1);
        assert!(catalog.get("a/x.ts").unwrap().selected);
        assert!(catalog.get("a/y.ts").unwrap().selected);
        assert!(catalog.get("b/z.ts").unwrap().selected);
    }

    #[test]
    fn toggling_checked_directory_deselects_all() {
        let mut catalog = scenario();
        toggle_path(&mut catalog, "b", |_| true);
        assert!(!catalog.get("b/z.ts").unwrap().selected);
        assert!(catalog.get("a/x.ts").unwrap().selected);
    }

    #[test]
    fn toggling_unchecked_directory_selects_only_text() {
        let mut catalog = FileCatalog::new(vec![
            rec("img/notes.txt", false),
            FileRecord::without_content("img/a.png", FileKind::Binary, 5),
        ]);
        toggle_path(&mut catalog, "img", |_| true);
        assert!(catalog.get("img/notes.txt").unwrap().selected);
        assert!(!catalog.get("img/a.png").unwrap().selected);
    }

    #[test]
    fn toggling_file_flips_it() {
        let mut catalog = scenario();
        toggle_path(&mut catalog, "a/y.ts", |_| true);
        assert!(catalog.get("a/y.ts").unwrap().selected);
        toggle_path(&mut catalog, "a/y.ts", |_| true);
        assert!(!catalog.get("a/y.ts").unwrap().selected);
    }

    #[test]
    fn toggle_respects_visible_subset() {
        let mut catalog = FileCatalog::new(vec![rec("src/a.rs", false), rec("src/b.md", false)]);
        toggle_path(&mut catalog, "src", |r| r.language == "rust");
        assert!(catalog.get("src/a.rs").unwrap().selected);
        assert!(!catalog.get("src/b.md").unwrap().selected);
    }

    #[test]
    fn filtered_out_directories_disappear() {
        let catalog = scenario();
        let roots = build(catalog.records().iter().filter(|r| r.path.contains("z")));
        assert!(find(&roots, "a").is_none());
        assert!(find(&roots, "b/z.ts").is_some());
    }

    #[test]
    fn flatten_hides_collapsed_children() {
        let catalog = scenario();
        let roots = build(catalog.records());

        let collapsed = flatten(&roots, &HashSet::new());
        let paths: Vec<&str> = collapsed.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["a", "b"]);

        let expanded: HashSet<String> = ["a".to_string()].into_iter().collect();
        let rows = flatten(&roots, &expanded);
        let paths: Vec<&str> = rows.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["a", "a/x.ts", "a/y.ts", "b"]);
        assert_eq!(rows[1].depth, 1);
        assert_eq!(rows[0].status, SelectionStatus::Partial);
        assert_eq!(rows[0].line_count, 2);
    }

    #[test]
    fn directory_paths_lists_nested_dirs() {
        let catalog = FileCatalog::new(vec![rec("a/b/c.rs", false), rec("d/e.rs", false)]);
        let roots = build(catalog.records());
        let mut dirs = directory_paths(&roots);
        dirs.sort();
        assert_eq!(dirs, vec!["a", "a/b", "d"]);
    }
}
