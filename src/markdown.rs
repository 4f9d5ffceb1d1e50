//! Markdown to [`Node`] compilation.
//!
//! Anchor tokens in running text are split out into their own inline `code`
//! elements, which is the shape the read-mode pass looks for. Tokens inside
//! fenced or indented code blocks are left as text.

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag};

use crate::anchor;
use crate::render::tree::{Element, Node};

/// Compile `source` into a tree rooted at an `article` element.
pub fn compile(source: &str) -> Node {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut stack: Vec<Element> = vec![Element::new("article")];
    let mut in_code_block = false;
    // The parser may split one run of text into several events.
    let mut pending = String::new();

    for event in Parser::new_ext(source, options) {
        if let Event::Text(text) = &event {
            pending.push_str(text);
            continue;
        }
        flush(&mut stack, &mut pending, in_code_block);

        match event {
            Event::Start(tag) => {
                if matches!(tag, Tag::CodeBlock(_)) {
                    in_code_block = true;
                }
                stack.push(open(tag));
            }
            Event::End(_) => {
                let Some(done) = stack.pop() else { break };
                let done = if done.tag == "pre" {
                    in_code_block = false;
                    wrap_code_block(done)
                } else {
                    done
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(done.into()),
                    None => {
                        stack.push(done);
                        break;
                    }
                }
            }
            Event::Code(code) => push(&mut stack, Element::new("code").text(code.to_string())),
            Event::Html(raw) | Event::InlineHtml(raw) => push(&mut stack, Node::text(raw.to_string())),
            Event::SoftBreak => push(&mut stack, Node::text("\n")),
            Event::HardBreak => push(&mut stack, Element::new("br")),
            Event::Rule => push(&mut stack, Element::new("hr")),
            Event::TaskListMarker(checked) => {
                let input = Element::new("input").attr("type", "checkbox");
                let input = if checked { input.attr("checked", "") } else { input };
                push(&mut stack, input);
            }
            _ => {}
        }
    }
    flush(&mut stack, &mut pending, in_code_block);

    // Unbalanced input: fold whatever is still open into the root.
    while stack.len() > 1 {
        if let Some(done) = stack.pop() {
            if let Some(parent) = stack.last_mut() {
                parent.children.push(done.into());
            }
        }
    }
    stack.pop().map(Node::from).unwrap_or_else(|| Element::new("article").into())
}

fn push(stack: &mut [Element], node: impl Into<Node>) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node.into());
    }
}

fn flush(stack: &mut [Element], pending: &mut String, in_code_block: bool) {
    if pending.is_empty() {
        return;
    }
    let text = std::mem::take(pending);
    let Some(parent) = stack.last_mut() else { return };
    if in_code_block {
        parent.children.push(Node::text(text));
    } else {
        push_text(parent, &text);
    }
}

fn open(tag: Tag<'_>) -> Element {
    match tag {
        Tag::Paragraph => Element::new("p"),
        Tag::Heading { level, .. } => Element::new(heading(level)),
        Tag::BlockQuote(_) => Element::new("blockquote"),
        Tag::CodeBlock(kind) => {
            let pre = Element::new("pre");
            match kind {
                CodeBlockKind::Fenced(lang) if !lang.is_empty() => pre.attr("data-lang", lang.to_string()),
                _ => pre,
            }
        }
        Tag::List(Some(start)) => Element::new("ol").attr("start", start.to_string()),
        Tag::List(None) => Element::new("ul"),
        Tag::Item => Element::new("li"),
        Tag::Table(_) => Element::new("table"),
        Tag::TableHead => Element::new("thead"),
        Tag::TableRow => Element::new("tr"),
        Tag::TableCell => Element::new("td"),
        Tag::Emphasis => Element::new("em"),
        Tag::Strong => Element::new("strong"),
        Tag::Strikethrough => Element::new("del"),
        Tag::Link { dest_url, .. } => Element::new("a").attr("href", dest_url.to_string()),
        Tag::Image { dest_url, .. } => Element::new("img").attr("src", dest_url.to_string()),
        _ => Element::new("div"),
    }
}

fn heading(level: HeadingLevel) -> &'static str {
    match level {
        HeadingLevel::H1 => "h1",
        HeadingLevel::H2 => "h2",
        HeadingLevel::H3 => "h3",
        HeadingLevel::H4 => "h4",
        HeadingLevel::H5 => "h5",
        HeadingLevel::H6 => "h6",
    }
}

/// `<pre>text</pre>` becomes `<pre><code>text</code></pre>`.
fn wrap_code_block(pre: Element) -> Element {
    let Element { tag, attrs, children } = pre;
    let code = Element {
        tag: "code".to_string(),
        attrs: Default::default(),
        children,
    };
    Element {
        tag,
        attrs,
        children: vec![code.into()],
    }
}

/// Append `text`, isolating every anchor token as its own code element.
fn push_text(parent: &mut Element, text: &str) {
    let mut cursor = 0;
    for found in anchor::parse(text) {
        if found.span.start > cursor {
            parent.children.push(Node::text(&text[cursor..found.span.start]));
        }
        parent
            .children
            .push(Element::new("code").text(&text[found.span.clone()]).into());
        cursor = found.span.end;
    }
    if cursor < text.len() {
        parent.children.push(Node::text(&text[cursor..]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes(node: &Node) -> Vec<String> {
        node.find_all(&|e| e.tag == "code")
            .into_iter()
            .map(|e| e.text_content())
            .collect()
    }

    #[test]
    fn anchors_in_text_become_code_spans() {
        let root = compile("See <<#42>> and <<Q#Shared/Open Bugs>> today.");
        assert_eq!(codes(&root), vec!["<<#42>>", "<<Q#Shared/Open Bugs>>"]);
        assert_eq!(root.text_content(), "See <<#42>> and <<Q#Shared/Open Bugs>> today.");
    }

    #[test]
    fn code_blocks_keep_tokens_as_text() {
        let root = compile("```\n<<#7>>\n```\n");
        let html = root.to_html();
        assert_eq!(html, "<article><pre><code>&lt;&lt;#7&gt;&gt;\n</code></pre></article>");
    }

    #[test]
    fn structure_is_preserved() {
        let root = compile("# Plan\n\n- <<#1>>\n- two\n");
        let html = root.to_html();
        assert!(html.starts_with("<article><h1>Plan</h1><ul><li><code>"));
        assert!(html.contains("<li>two</li>"));
    }
}
