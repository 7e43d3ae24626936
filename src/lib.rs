/*!

A grammar driven reader and writer for Simis (JINX) game data files, the
format used by Microsoft Train Simulator for shapes, worlds, terrain, and
most other resources.

Every Simis file is described by a grammar that is loaded at runtime from a
BNF-like description. Each production of the grammar is compiled into a
finite state machine, and a [`Cursor`] walks those machines to decide what
may legally appear next in a stream. The same cursor drives both encodings
of the format:

- Binary bodies carry no type information, so the cursor's candidates decide
  how many bytes a value occupies and how to decode them.
- Text bodies carry no block boundaries beyond parentheses, so the cursor
  decides which words name blocks and which type each value has.

## Quick Start

```rust
use simis::{Block, SimisFile, SimisFormat, TokenTable};

let format = SimisFormat::from_grammar_text(r#"
    FILE = :shape .
    FILE_NAME = "Shape" .
    FILE_EXT = "s" .
    FILE_TYPE = "s" .
    FILE_TYPE_VER = "1" .
    shape ==> :uint,Version {:point} .
    point ==> :float,X :float,Y .
"#).unwrap();

let data = b"SIMISA@@@@@@@@@@JINX0s1t______\r\nshape ( 3 point ( 1.5 -2 ) )";
let tokens = TokenTable::new();
let file = SimisFile::parse(&format, &tokens, &data[..]).unwrap();

let root: &Block = file.root();
assert_eq!(root.type_name(), "shape");
assert_eq!(root.find("point").map(|x| x.values().count()), Some(2));
```

## Grammar sets

A resource directory holds one `.bnf` grammar per format and `.tok` token
tables shared by every binary stream. [`GrammarSet::load_dir`] loads them all,
and [`GrammarSet::parse`] picks the format a stream's signature names.

```no_run
use simis::GrammarSet;

let pending = GrammarSet::spawn_load("Resources");
// ... other start up work ...
let set = pending.join().unwrap();
let file = set.parse(&std::fs::read("route.w").unwrap()).unwrap();
println!("{}", file.root().type_name());
```

## Editing

Trees are persistent: edits return new blocks that share every untouched
subtree, and a [`SimisFile`] keeps every previous root for undo and redo.

*/

pub mod binary;
mod cursor;
mod envelope;
mod errors;
mod format;
mod fsm;
mod grammar;
mod set;
pub mod text;
mod token;
mod tree;
pub(crate) mod util;

pub use self::binary::{TokenResolver, TokenTable};
pub use self::cursor::{Candidate, CandidateKind, Cursor, CursorError, BEGIN_BLOCK, END_BLOCK};
pub use self::envelope::{write_text, Body, Envelope, EnvelopeWriter, JinxHeader, StreamFormat, StreamMode};
pub use self::errors::*;
pub use self::format::SimisFormat;
pub use self::fsm::{Fsm, State, StateId, StateKind};
pub use self::grammar::{FormatInfo, Grammar, GrammarError, GrammarErrorKind, Operator, Rule};
pub use self::set::{GrammarSet, PendingGrammarSet};
pub use self::text::{TextWriter, TextWriterBuilder};
pub use self::token::{BinaryRepr, PrimitiveType, Token, Value, ValueData};
pub use self::tree::{Block, Node, SimisFile, TreeBuilder};
