//! Plain-text rendering of views.

use std::fmt::Write;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use super::{ChildrenState, DetailView, ItemsView, QueryView, Tab};
use crate::models::{Item, NOT_AVAILABLE};

const PROPOSED: char = '◇';
const ACTIVE: char = '○';
const DONE: char = '●';
const REMOVED: char = '✗';
const OTHER: char = '•';

/// Status symbol for a work item state name.
pub fn state_symbol(state: &str) -> char {
    match state.to_ascii_lowercase().as_str() {
        "new" | "proposed" | "to do" => PROPOSED,
        "active" | "committed" | "in progress" | "doing" => ACTIVE,
        "resolved" | "closed" | "done" | "completed" => DONE,
        "removed" | "cut" => REMOVED,
        _ => OTHER,
    }
}

/// Reduce HTML rich text to readable plain text.
pub fn html_to_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut chars = html.chars();
    while let Some(c) = chars.next() {
        if c != '<' {
            out.push(c);
            continue;
        }
        let mut tag = String::new();
        for t in chars.by_ref() {
            if t == '>' {
                break;
            }
            tag.push(t);
        }
        let name = tag
            .trim_start_matches('/')
            .split(|c: char| c.is_whitespace() || c == '/')
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();
        if matches!(name.as_str(), "br" | "p" | "div" | "li" | "tr" | "h1" | "h2" | "h3")
            && tag.starts_with('/') == (name != "br")
        {
            out.push('\n');
        }
        if name == "li" && !tag.starts_with('/') {
            out.push_str("- ");
        }
    }

    let decoded = decode_entities(&out);

    let mut lines: Vec<&str> = Vec::new();
    for line in decoded.lines().map(str::trim_end) {
        if line.trim().is_empty() && lines.last().is_none_or(|l| l.trim().is_empty()) {
            continue;
        }
        lines.push(line);
    }
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

fn entity_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]+);")
            .expect("entity pattern is valid")
    })
}

/// Decode named and numeric character references in one pass. Unknown or
/// invalid references are left as written.
fn decode_entities(text: &str) -> String {
    entity_pattern()
        .replace_all(text, |caps: &Captures<'_>| {
            let body = &caps[1];
            let decoded = match body.strip_prefix('#') {
                Some(num) => {
                    let code = match num.strip_prefix(['x', 'X']) {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => num.parse::<u32>().ok(),
                    };
                    code.filter(|&code| code != 0).and_then(char::from_u32)
                }
                None => match body {
                    "nbsp" => Some(' '),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "amp" => Some('&'),
                    "ndash" => Some('–'),
                    "mdash" => Some('—'),
                    "hellip" => Some('…'),
                    "lsquo" => Some('‘'),
                    "rsquo" => Some('’'),
                    "ldquo" => Some('“'),
                    "rdquo" => Some('”'),
                    _ => None,
                },
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

pub(super) fn render_detail(view: &DetailView) -> String {
    let item = view.item();
    let mut out = String::new();
    let _ = writeln!(out, "#{} {} [{}]", item.id, item.title(), item.state());
    let _ = writeln!(out, "{} · rev {}", item.work_item_type(), item.rev);
    if let Some(link) = view.link() {
        let _ = writeln!(out, "Open: {}", link);
    }

    let tabs: Vec<String> = view
        .tabs()
        .into_iter()
        .map(|(tab, label)| {
            if tab == view.active_tab() {
                format!("[{}]", label)
            } else {
                label
            }
        })
        .collect();
    let _ = writeln!(out, "{}", tabs.join("  "));
    out.push_str("────────\n");

    match view.active_tab() {
        Tab::Description => {
            let text = item
                .fields
                .description
                .as_deref()
                .map(html_to_text)
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "No description.".to_string());
            out.push_str(&text);
            out.push('\n');
        }
        Tab::Contacts => {
            for (label, who) in view.contacts() {
                let who = who.map(|w| w.label()).unwrap_or_else(|| NOT_AVAILABLE.to_string());
                let _ = writeln!(out, "{}: {}", label, who);
            }
        }
        Tab::Children => match view.children() {
            ChildrenState::NotLoaded => out.push_str("Loading…\n"),
            ChildrenState::Failed(message) => {
                let _ = writeln!(out, "{}", message);
            }
            ChildrenState::Loaded(items) if items.is_empty() => out.push_str("No child items found.\n"),
            ChildrenState::Loaded(items) => {
                render_children(&mut out, items, |id| view.is_child_expanded(id));
            }
        },
        Tab::Group(index) => {
            if let Some((_, fields)) = view.group(index) {
                for (spec, value) in fields {
                    let value = value.unwrap_or_else(|| NOT_AVAILABLE.to_string());
                    let _ = writeln!(out, "{}: {}", spec.label, value);
                }
            }
        }
    }
    out
}

/// Children as a branch list; expanded rows show description and assignee.
fn render_children(out: &mut String, items: &[Item], expanded: impl Fn(i64) -> bool) {
    for (i, item) in items.iter().enumerate() {
        let is_last = i == items.len() - 1;
        let branch = if is_last { "└── " } else { "├── " };
        let _ = writeln!(
            out,
            "{}{} #{} {} [{}]",
            branch,
            state_symbol(item.state()),
            item.id,
            item.title(),
            item.state()
        );

        if !expanded(item.id) {
            continue;
        }
        let continuation = if is_last { "    " } else { "│   " };
        let assignee = item
            .fields
            .assigned_to
            .as_ref()
            .map(|w| w.label())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());
        let _ = writeln!(out, "{}Assigned To: {}", continuation, assignee);
        let description = item
            .fields
            .description
            .as_deref()
            .map(html_to_text)
            .unwrap_or_default();
        for line in description.lines() {
            let _ = writeln!(out, "{}{}", continuation, line);
        }
    }
}

pub(super) fn render_query(view: &QueryView) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Query: {} ({})", view.identifier, view.rows.len());
    if view.rows.is_empty() {
        out.push_str("No work items found.\n");
        return out;
    }
    for row in &view.rows {
        let _ = writeln!(
            out,
            "{} #{} {} · {} [{}]\n    {}",
            state_symbol(&row.state),
            row.id,
            row.work_item_type,
            row.title,
            row.state,
            row.url
        );
    }
    out
}

pub(super) fn render_items(view: &ItemsView) -> String {
    let mut out = String::new();
    match view.parent_id {
        Some(id) => {
            let _ = writeln!(out, "#{}", id);
        }
        None => out.push_str("Children\n"),
    }
    if view.items.is_empty() {
        out.push_str("No child items found.\n");
    } else {
        render_children(&mut out, &view.items, |_| false);
    }
    out
}
