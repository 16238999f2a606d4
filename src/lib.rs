/*!
Streaming XZ+VCDIFF block patcher, for rewriting a *source* byte stream into a
*target* byte stream in place, on resource-constrained devices. The original
use case is A/B system-image updates, where source and target may be the same
underlying file.

Build the CLI with:
```shell
$ cargo build --release --bins --features cmd
$ target/release/blkpatch -h
```

Apply a patch in memory:
```rust
use std::io;
use blkdelta::{Bpatch, DontCareMap};

fn apply(source: &[u8], patch: &[u8]) -> blkdelta::Result<Vec<u8>> {
    let mut target = Vec::new();
    let map = DontCareMap::identity();
    Bpatch::new(patch).apply(
        io::Cursor::new(source),
        &map,
        io::Cursor::new(&mut target),
        &map,
        false,
    )?;
    Ok(target)
}
```

This crate never creates patches; it only consumes a pre-built XZ-compressed
VCDIFF patch stream. `source` and `target` may be independent file
descriptions over the *same* underlying file (e.g. two `File::try_clone`s),
which is how A/B in-place updates are applied without a second partition.
*/

pub mod cache;
pub mod dontcare;
pub mod engine;
pub mod error;
pub mod tunables;
pub mod vcdiff;
pub mod writequeue;
pub mod xzfeed;

pub use dontcare::{DontCareMap, MapState};
pub use engine::Bpatch;
pub use error::{PatchError, Result};
