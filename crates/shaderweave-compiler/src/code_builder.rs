//! Indented text output with source-range tracking.
//!
//! [`ShaderCodeBuilder`] accumulates generated text and keeps an explicit
//! stack of open [`RangeMapping`] frames. Callers push a frame before
//! emitting a construct and pop it afterwards; the popped frame records the
//! destination byte range it covered and becomes a child of the frame below
//! it. Expressions translated out of line carry their own relative mappings
//! and are spliced in with [`ShaderCodeBuilder::append_mapped`].

use std::ops::Range;
use std::sync::Arc;

use shaderweave_core::Span;

/// A source span and the generated bytes it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeMapping {
    /// Source unit the span belongs to.
    pub origin: Arc<str>,
    pub source: Span,
    /// Byte range in the generated text.
    pub dest: Range<usize>,
    /// Mappings of nested constructs, in output order.
    pub children: Vec<RangeMapping>,
}

impl RangeMapping {
    pub fn new(origin: Arc<str>, source: Span, dest: Range<usize>) -> Self {
        Self {
            origin,
            source,
            dest,
            children: Vec::new(),
        }
    }

    /// The deepest mapping containing `offset`.
    pub fn find(&self, offset: usize) -> Option<&RangeMapping> {
        if !self.dest.contains(&offset) {
            return None;
        }
        self.children
            .iter()
            .find_map(|child| child.find(offset))
            .or(Some(self))
    }

    /// Move this mapping and all its children by `delta` bytes.
    pub fn shift(&mut self, delta: usize) {
        self.dest = self.dest.start + delta..self.dest.end + delta;
        for child in &mut self.children {
            child.shift(delta);
        }
    }

    /// Nesting depth below this frame, counting itself.
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(RangeMapping::depth).max().unwrap_or(0)
    }
}

/// Find the deepest mapping covering `offset` among top-level mappings.
pub fn find_mapping(mappings: &[RangeMapping], offset: usize) -> Option<&RangeMapping> {
    mappings.iter().find_map(|m| m.find(offset))
}

#[derive(Debug)]
struct OpenFrame {
    origin: Arc<str>,
    source: Span,
    start: usize,
    children: Vec<RangeMapping>,
}

/// Builds generated source text.
#[derive(Debug)]
pub struct ShaderCodeBuilder {
    text: String,
    indent: usize,
    indent_unit: &'static str,
    frames: Vec<OpenFrame>,
    mappings: Vec<RangeMapping>,
}

impl Default for ShaderCodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderCodeBuilder {
    pub fn new() -> Self {
        Self::with_indent("    ")
    }

    pub fn with_indent(indent_unit: &'static str) -> Self {
        Self {
            text: String::new(),
            indent: 0,
            indent_unit,
            frames: Vec::new(),
            mappings: Vec::new(),
        }
    }

    // === Text ===

    /// Append raw text.
    pub fn write(&mut self, text: &str) -> &mut Self {
        self.text.push_str(text);
        self
    }

    /// Append the current indentation.
    pub fn write_indent(&mut self) -> &mut Self {
        for _ in 0..self.indent {
            self.text.push_str(self.indent_unit);
        }
        self
    }

    /// Append an indented line.
    pub fn line(&mut self, text: &str) -> &mut Self {
        self.write_indent();
        self.text.push_str(text);
        self.text.push('\n');
        self
    }

    pub fn newline(&mut self) -> &mut Self {
        self.text.push('\n');
        self
    }

    /// Write `{` on its own line and indent.
    pub fn begin_scope(&mut self) -> &mut Self {
        self.line("{");
        self.indent += 1;
        self
    }

    /// Dedent and write `}`.
    pub fn end_scope(&mut self) -> &mut Self {
        self.end_scope_with("")
    }

    /// Dedent and write `}` followed by `suffix`, e.g. `;` after a struct.
    pub fn end_scope_with(&mut self, suffix: &str) -> &mut Self {
        self.indent = self.indent.saturating_sub(1);
        self.write_indent();
        self.text.push('}');
        self.text.push_str(suffix);
        self.text.push('\n');
        self
    }

    pub fn indent_level(&self) -> usize {
        self.indent
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    // === Mappings ===

    /// Open a mapping frame at the current output position.
    pub fn push_mapping(&mut self, origin: &Arc<str>, source: Span) {
        self.frames.push(OpenFrame {
            origin: origin.clone(),
            source,
            start: self.text.len(),
            children: Vec::new(),
        });
    }

    /// Close the innermost frame. Unbalanced pops are ignored.
    pub fn pop_mapping(&mut self) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        let mapping = RangeMapping {
            origin: frame.origin,
            source: frame.source,
            dest: frame.start..self.text.len(),
            children: frame.children,
        };
        self.attach(mapping);
    }

    /// Number of open frames.
    pub fn mapping_depth(&self) -> usize {
        self.frames.len()
    }

    /// Append text that carries mappings relative to its own start.
    pub fn append_mapped(&mut self, text: &str, mappings: &[RangeMapping]) -> &mut Self {
        let offset = self.text.len();
        self.text.push_str(text);
        for mapping in mappings {
            let mut mapping = mapping.clone();
            mapping.shift(offset);
            self.attach(mapping);
        }
        self
    }

    fn attach(&mut self, mapping: RangeMapping) {
        match self.frames.last_mut() {
            Some(parent) => parent.children.push(mapping),
            None => self.mappings.push(mapping),
        }
    }

    /// Closed top-level mappings so far.
    pub fn mappings(&self) -> &[RangeMapping] {
        &self.mappings
    }

    /// Close any frames still open and return the text and mappings.
    pub fn finish(mut self) -> (String, Vec<RangeMapping>) {
        while !self.frames.is_empty() {
            self.pop_mapping();
        }
        (self.text, self.mappings)
    }

    /// The text alone.
    pub fn into_string(self) -> String {
        self.finish().0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Arc<str> {
        Arc::from("unit")
    }

    #[test]
    fn scopes_indent() {
        let mut b = ShaderCodeBuilder::new();
        b.line("struct A");
        b.begin_scope();
        b.line("float x;");
        b.end_scope_with(";");
        assert_eq!(b.into_string(), "struct A\n{\n    float x;\n};\n");
    }

    #[test]
    fn frames_nest_and_find_deepest() {
        let o = origin();
        let mut b = ShaderCodeBuilder::new();
        b.push_mapping(&o, Span::new(1, 1, 0, 20));
        b.write("void f() { ");
        b.push_mapping(&o, Span::new(1, 12, 11, 5));
        b.write("x = 1;");
        b.pop_mapping();
        b.write(" }");
        b.pop_mapping();
        let (text, mappings) = b.finish();
        assert_eq!(text, "void f() { x = 1; }");
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].depth(), 2);

        let inner = find_mapping(&mappings, 12).unwrap();
        assert_eq!(inner.source.offset, 11);
        let outer = find_mapping(&mappings, 2).unwrap();
        assert_eq!(outer.source.offset, 0);
        assert!(find_mapping(&mappings, 100).is_none());
    }

    #[test]
    fn appended_mappings_are_shifted_into_open_frame() {
        let o = origin();
        let expr = vec![RangeMapping::new(o.clone(), Span::new(3, 5, 40, 3), 0..3)];
        let mut b = ShaderCodeBuilder::new();
        b.push_mapping(&o, Span::new(3, 1, 36, 10));
        b.write("y = ");
        b.append_mapped("a.b", &expr);
        b.write(";");
        b.pop_mapping();
        let (_, mappings) = b.finish();
        let child = &mappings[0].children[0];
        assert_eq!(child.dest, 4..7);
        assert_eq!(find_mapping(&mappings, 5).unwrap().source.offset, 40);
    }

    #[test]
    fn unbalanced_pop_is_ignored() {
        let mut b = ShaderCodeBuilder::new();
        b.pop_mapping();
        b.write("x");
        assert_eq!(b.mapping_depth(), 0);
        assert!(b.finish().1.is_empty());
    }
}
