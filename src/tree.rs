//! Persistent trees assembled from token streams.
//!
//! Blocks are immutable and share their children through [`Arc`], so every
//! edit returns a new block that reuses every subtree it did not touch. This
//! is what makes [`SimisFile`] undo and redo cheap: each history entry is
//! just another root.

use crate::binary::{self, TokenResolver};
use crate::envelope::{write_text, Body, Envelope, EnvelopeWriter, JinxHeader, StreamFormat, StreamMode};
use crate::format::SimisFormat;
use crate::text;
use crate::token::{Token, Value};
use crate::{Error, ErrorKind};
use std::io::{Cursor as IoCursor, Seek, Write};
use std::sync::Arc;

/// A child of a block
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize), serde(untagged))]
pub enum Node {
    Block(Block),
    Value(Value),
}

impl From<Block> for Node {
    fn from(block: Block) -> Self {
        Node::Block(block)
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        Node::Value(value)
    }
}

#[derive(Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
struct BlockData {
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    type_name: String,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    label: Option<String>,
    children: Vec<Node>,
}

/// An immutable block of a parsed stream
#[derive(Debug, Clone)]
pub struct Block(Arc<BlockData>);

#[cfg(feature = "serde")]
impl serde::Serialize for Block {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serde::Serialize::serialize(&*self.0, serializer)
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

fn index_error(index: usize, len: usize) -> Error {
    Error::bounds(format!("child index {} is out of range for a block of {} children", index, len))
}

impl Block {
    pub fn new<T: Into<String>>(type_name: T, label: Option<String>, children: Vec<Node>) -> Block {
        Block(Arc::new(BlockData {
            type_name: type_name.into(),
            label,
            children,
        }))
    }

    pub fn type_name(&self) -> &str {
        &self.0.type_name
    }

    pub fn label(&self) -> Option<&str> {
        self.0.label.as_deref()
    }

    pub fn children(&self) -> &[Node] {
        &self.0.children
    }

    /// The first child block of the given type, ignoring ASCII case
    pub fn find(&self, type_name: &str) -> Option<&Block> {
        self.children().iter().find_map(|x| match x {
            Node::Block(b) if b.type_name().eq_ignore_ascii_case(type_name) => Some(b),
            _ => None,
        })
    }

    /// Values held directly by this block
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.children().iter().filter_map(|x| match x {
            Node::Value(v) => Some(v),
            Node::Block(_) => None,
        })
    }

    /// Whether both blocks are the same allocation
    pub fn ptr_eq(a: &Block, b: &Block) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    fn with_children(&self, children: Vec<Node>) -> Block {
        Block::new(self.0.type_name.clone(), self.0.label.clone(), children)
    }

    pub fn rename<T: Into<String>>(&self, type_name: T, label: Option<String>) -> Block {
        Block::new(type_name, label, self.0.children.clone())
    }

    pub fn append_child<N: Into<Node>>(&self, node: N) -> Block {
        let mut children = self.0.children.clone();
        children.push(node.into());
        self.with_children(children)
    }

    /// Insert a child before the given index. An index equal to the number
    /// of children appends.
    pub fn insert_before<N: Into<Node>>(&self, index: usize, node: N) -> Result<Block, Error> {
        let mut children = self.0.children.clone();
        if index > children.len() {
            return Err(index_error(index, children.len()));
        }

        children.insert(index, node.into());
        Ok(self.with_children(children))
    }

    pub fn replace_child<N: Into<Node>>(&self, index: usize, node: N) -> Result<Block, Error> {
        let mut children = self.0.children.clone();
        let len = children.len();
        let slot = children.get_mut(index).ok_or_else(|| index_error(index, len))?;
        *slot = node.into();
        Ok(self.with_children(children))
    }

    pub fn remove_child(&self, index: usize) -> Result<Block, Error> {
        let mut children = self.0.children.clone();
        if index >= children.len() {
            return Err(index_error(index, children.len()));
        }

        children.remove(index);
        Ok(self.with_children(children))
    }

    /// Apply an edit to the block found by following child indices from
    /// this one. Only the blocks along the path are rebuilt.
    pub fn update_at<F>(&self, path: &[usize], f: F) -> Result<Block, Error>
    where
        F: FnOnce(&Block) -> Result<Block, Error>,
    {
        let Some((&index, rest)) = path.split_first() else {
            return f(self);
        };

        match self.children().get(index) {
            Some(Node::Block(child)) => {
                let child = child.update_at(rest, f)?;
                self.replace_child(index, child)
            }
            Some(Node::Value(_)) => Err(Error::bounds(format!("child {} is a value, not a block", index))),
            None => Err(index_error(index, self.children().len())),
        }
    }

    /// The token sequence this block was built from
    pub fn tokens(&self) -> Vec<Token> {
        let mut out = Vec::new();
        self.push_tokens(&mut out);
        out
    }

    fn push_tokens(&self, out: &mut Vec<Token>) {
        out.push(Token::BlockHeader {
            type_name: self.0.type_name.clone(),
            label: self.0.label.clone(),
        });
        out.push(Token::BlockBegin);
        for child in self.children() {
            match child {
                Node::Block(b) => b.push_tokens(out),
                Node::Value(v) => out.push(Token::Value(v.clone())),
            }
        }
        out.push(Token::BlockEnd);
    }
}

#[derive(Debug)]
struct OpenBlock {
    type_name: String,
    label: Option<String>,
    children: Vec<Node>,
}

/// Folds a token stream into a tree
#[derive(Debug, Default)]
pub struct TreeBuilder {
    stack: Vec<OpenBlock>,
    header: Option<OpenBlock>,
    root: Option<Block>,
}

fn misplaced(found: &str) -> Error {
    Error::new(ErrorKind::UnexpectedToken {
        expected: Vec::new(),
        found: found.to_string(),
    })
}

impl TreeBuilder {
    pub fn new() -> TreeBuilder {
        TreeBuilder::default()
    }

    pub fn push(&mut self, token: Token) -> Result<(), Error> {
        if self.root.is_some() {
            return Err(misplaced("token after the root block"));
        }

        if self.header.is_some() && token != Token::BlockBegin {
            return Err(misplaced("block header without a block begin"));
        }

        match token {
            Token::BlockHeader { type_name, label } => {
                self.header = Some(OpenBlock {
                    type_name,
                    label,
                    children: Vec::new(),
                });
            }
            Token::BlockBegin => {
                let block = self.header.take().ok_or_else(|| misplaced("block begin without a header"))?;
                self.stack.push(block);
            }
            Token::BlockEnd => {
                let open = self.stack.pop().ok_or_else(|| misplaced("unmatched block end"))?;
                let block = Block::new(open.type_name, open.label, open.children);
                match self.stack.last_mut() {
                    Some(parent) => parent.children.push(Node::Block(block)),
                    None => self.root = Some(block),
                }
            }
            Token::Value(value) => {
                let parent = self.stack.last_mut().ok_or_else(|| misplaced("value outside a block"))?;
                parent.children.push(Node::Value(value));
            }
        }

        Ok(())
    }

    pub fn finish(self) -> Result<Block, Error> {
        self.root.ok_or_else(|| misplaced("end of stream before the root block closed"))
    }

    pub fn build<I: IntoIterator<Item = Token>>(tokens: I) -> Result<Block, Error> {
        let mut builder = TreeBuilder::new();
        for token in tokens {
            builder.push(token)?;
        }
        builder.finish()
    }
}

/// A parsed stream: its framing, its root block, and an edit history
#[derive(Debug, Clone)]
pub struct SimisFile {
    header: JinxHeader,
    compressed: bool,
    root: Block,
    undo: Vec<Block>,
    redo: Vec<Block>,
}

impl SimisFile {
    pub fn new(header: JinxHeader, compressed: bool, root: Block) -> SimisFile {
        SimisFile {
            header,
            compressed,
            root,
            undo: Vec::new(),
            redo: Vec::new(),
        }
    }

    /// Parse a framed stream with the given format
    pub fn parse<R>(format: &SimisFormat, resolver: R, data: &[u8]) -> Result<SimisFile, Error>
    where
        R: TokenResolver,
    {
        SimisFile::from_envelope(format, resolver, Envelope::parse(data)?)
    }

    /// Parse the body of a stream whose framing has already been removed
    pub fn from_envelope<R>(format: &SimisFormat, resolver: R, envelope: Envelope) -> Result<SimisFile, Error>
    where
        R: TokenResolver,
    {
        let info = format.info();
        let header = envelope.header().clone();
        if header.file_type() != info.file_type() || header.version() != info.version() {
            let msg = format!(
                "stream is type {}{} but {} expects {}{}",
                header.file_type(),
                header.version(),
                info.name(),
                info.file_type(),
                info.version()
            );

            // the type and version follow `JINX0` after the outer signature
            let line = header.to_string();
            return Err(Error::framing(msg).at(line.as_bytes(), 5..7).offset_by(16));
        }

        let compressed = envelope.format().compressed;
        let tokens = match envelope.into_body() {
            Body::Binary(data) => binary::read_tokens(format, resolver, &data)?,
            Body::Text(data) => text::read_tokens(format, &data)?,
        };

        let root = TreeBuilder::build(tokens)?;
        Ok(SimisFile::new(header, compressed, root))
    }

    pub fn header(&self) -> &JinxHeader {
        &self.header
    }

    pub fn stream_format(&self) -> StreamFormat {
        StreamFormat {
            mode: self.header.mode(),
            compressed: self.compressed,
        }
    }

    /// Change how the file is serialized. Compressed text is rejected.
    pub fn set_stream_format(&mut self, format: StreamFormat) -> Result<(), Error> {
        if format.compressed && format.mode == StreamMode::Text {
            return Err(Error::framing("compressed streams must have a binary body"));
        }

        self.header = JinxHeader::new(self.header.file_type(), self.header.version(), format.mode)?;
        self.compressed = format.compressed;
        Ok(())
    }

    pub fn root(&self) -> &Block {
        &self.root
    }

    /// Replace the root, recording the previous one for undo
    pub fn set_root(&mut self, root: Block) {
        let previous = std::mem::replace(&mut self.root, root);
        self.undo.push(previous);
        self.redo.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Restore the previous root. Returns false if there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        match self.undo.pop() {
            Some(root) => {
                let current = std::mem::replace(&mut self.root, root);
                self.redo.push(current);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.redo.pop() {
            Some(root) => {
                let current = std::mem::replace(&mut self.root, root);
                self.undo.push(current);
                true
            }
            None => false,
        }
    }

    /// Write the file with its framing
    pub fn serialize<R, W>(&self, format: &SimisFormat, resolver: R, writer: W) -> Result<W, Error>
    where
        R: TokenResolver,
        W: Write + Seek,
    {
        let tokens = self.root.tokens();
        match self.header.mode() {
            StreamMode::Binary => {
                let body = binary::write_tokens(format, resolver, IoCursor::new(Vec::new()), &tokens)?;
                let mut out = EnvelopeWriter::binary(writer, &self.header, self.compressed)?;
                out.write_all(body.get_ref())?;
                out.finish()
            }
            StreamMode::Text if self.compressed => {
                Err(Error::framing("compressed streams must have a binary body"))
            }
            StreamMode::Text => {
                let body = text::write_tokens(format, Vec::new(), &tokens)?;
                let body = String::from_utf8(body)
                    .map_err(|_| Error::framing("text writer produced invalid UTF-8"))?;
                write_text(writer, &self.header, &body)
            }
        }
    }
}
