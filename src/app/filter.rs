use crate::catalog::{FileKind, FileRecord};
use glob::{MatchOptions, Pattern};

// ── Types ──

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizeOp {
    GreaterThan,
    LessThan,
}

#[derive(Debug, Clone)]
pub enum FilterRule {
    Glob { include: bool, pattern: Pattern },
    Kind { include: bool, kind: FileKind },
    Selected { include: bool, selected: bool },
    Lines { include: bool, op: SizeOp, threshold: usize },
}

pub struct FilterPreset {
    pub name: &'static str,
    pub expr: &'static str,
}

pub const FILTER_PRESETS: &[FilterPreset] = &[
    FilterPreset { name: "frontend", expr: "*.ts,*.tsx,*.js,*.jsx,*.html,*.css,*.scss,*.svelte,*.vue" },
    FilterPreset { name: "backend",  expr: "*.rs,*.py,*.go,*.java,*.sql,*.ts" }, // *.ts appears in frontend too
    FilterPreset { name: "config",   expr: "*.toml,*.yaml,*.yml,*.json,*.env" },
    FilterPreset { name: "docs",     expr: "*.md,*.txt,*.rst" },
];

impl FilterRule {
    fn is_include(&self) -> bool {
        match self {
            FilterRule::Glob { include, .. } => *include,
            FilterRule::Kind { include, .. } => *include,
            FilterRule::Selected { include, .. } => *include,
            FilterRule::Lines { include, .. } => *include,
        }
    }
}

/// Everything that narrows the flat record list before the tree is built
#[derive(Debug, Clone, Default)]
pub struct Filter {
    /// Case-insensitive path substring
    pub search: String,
    /// Exact language tag
    pub language: Option<String>,
    pub expr: String,
    pub rules: Vec<FilterRule>,
}

impl Filter {
    pub fn is_active(&self) -> bool {
        !self.search.is_empty() || self.language.is_some() || !self.rules.is_empty()
    }

    /// Parse and store a rule expression; a preset name expands to its expression.
    pub fn set_expr(&mut self, expr: &str) {
        let expr = expr.trim();
        let resolved = FILTER_PRESETS
            .iter()
            .find(|p| p.name == expr)
            .map(|p| p.expr)
            .unwrap_or(expr);
        self.expr = expr.to_string();
        self.rules = parse_filter_expr(resolved);
    }

    pub fn clear(&mut self) {
        *self = Filter::default();
    }

    /// Pipeline: language → search → rules
    pub fn matches(&self, record: &FileRecord) -> bool {
        if let Some(ref lang) = self.language {
            if &record.language != lang {
                return false;
            }
        }
        if !self.search.is_empty() {
            let q = self.search.to_lowercase();
            if !record.path.to_lowercase().contains(&q) {
                return false;
            }
        }
        apply_filter(&self.rules, record)
    }
}

// ── Parser ──

/// Parse a comma-separated filter expression into a list of rules.
/// Invalid globs are silently skipped.
pub fn parse_filter_expr(expr: &str) -> Vec<FilterRule> {
    let mut rules = Vec::new();
    for segment in expr.split(',') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }

        // Extract +/- prefix
        let (include, body) = if let Some(rest) = segment.strip_prefix('-') {
            (false, rest.trim())
        } else if let Some(rest) = segment.strip_prefix('+') {
            (true, rest.trim())
        } else {
            (true, segment)
        };

        if body.is_empty() {
            continue;
        }

        if let Some(rule) = try_parse_lines(include, body) {
            rules.push(rule);
            continue;
        }

        if let Some(rule) = try_parse_keyword(include, body) {
            rules.push(rule);
            continue;
        }

        // Otherwise treat as glob pattern
        if let Ok(pattern) = Pattern::new(body) {
            rules.push(FilterRule::Glob { include, pattern });
        }
        // Invalid globs silently skipped
    }
    rules
}

fn try_parse_lines(include: bool, body: &str) -> Option<FilterRule> {
    if let Some(num_str) = body.strip_prefix('>') {
        if let Ok(n) = num_str.trim().parse::<usize>() {
            return Some(FilterRule::Lines {
                include,
                op: SizeOp::GreaterThan,
                threshold: n,
            });
        }
    }
    if let Some(num_str) = body.strip_prefix('<') {
        if let Ok(n) = num_str.trim().parse::<usize>() {
            return Some(FilterRule::Lines {
                include,
                op: SizeOp::LessThan,
                threshold: n,
            });
        }
    }
    None
}

fn try_parse_keyword(include: bool, body: &str) -> Option<FilterRule> {
    let rule = match body.to_lowercase().as_str() {
        "text" => FilterRule::Kind { include, kind: FileKind::Text },
        "binary" => FilterRule::Kind { include, kind: FileKind::Binary },
        "oversized" => FilterRule::Kind { include, kind: FileKind::Oversized },
        "selected" => FilterRule::Selected { include, selected: true },
        "unselected" => FilterRule::Selected { include, selected: false },
        _ => return None,
    };
    Some(rule)
}

// ── Evaluator ──

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Apply filter rules to a record. Returns true if the record should be visible.
pub fn apply_filter(rules: &[FilterRule], record: &FileRecord) -> bool {
    if rules.is_empty() {
        return true;
    }

    let has_includes = rules.iter().any(|r| r.is_include());

    // Phase 1: Check include rules (OR logic)
    let included = if has_includes {
        rules.iter().any(|r| r.is_include() && matches_rule(r, record))
    } else {
        // No include rules → start with all records
        true
    };

    if !included {
        return false;
    }

    // Phase 2: Check exclude rules (any match removes the record)
    let excluded = rules
        .iter()
        .any(|r| !r.is_include() && matches_rule(r, record));

    !excluded
}

fn matches_rule(rule: &FilterRule, record: &FileRecord) -> bool {
    match rule {
        FilterRule::Glob { pattern, .. } => pattern.matches_with(&record.path, MATCH_OPTIONS),
        FilterRule::Kind { kind, .. } => record.kind == *kind,
        FilterRule::Selected { selected, .. } => record.selected == *selected,
        FilterRule::Lines { op, threshold, .. } => match op {
            SizeOp::GreaterThan => record.line_count > *threshold,
            SizeOp::LessThan => record.line_count < *threshold,
        },
    }
}
