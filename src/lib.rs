//! Zero-copy streaming tokenizers for FASTA and FASTQ.
//!
//! Tokenizers hand out records as window offsets ([`BufferRef`]) rather than
//! slices, so a record can be kept while the window keeps growing. Resolve a
//! record with `value(tokenizer.window())`. When consumed bytes are released
//! from the tokenizer, every record still held has to be released by the same
//! amount; [`Retained`] bundles them so this is one call.
//!
//! ```
//! use seq_tokens::FastaTokenizer;
//!
//! let mut tokenizer = FastaTokenizer::from_reader(&b">E1 f1|f2\nACGT\nAC\n"[..]);
//! let token = tokenizer.next_token()?;
//! let record = token.value(tokenizer.window())?;
//! assert_eq!(record.entry_id, b"E1");
//! assert_eq!(&*record.seq_bases(), b"ACGTAC");
//!
//! let end_pos = token.end_pos;
//! tokenizer.release(end_pos)?;
//! assert!(tokenizer.next_token()?.is_sentinel());
//! # Ok::<(), seq_tokens::TokenError>(())
//! ```

mod buffer_ref;
mod error;
mod fasta;
mod fastq;
mod scanner;
mod source;

pub use buffer_ref::{BufferRef, Release, Retained};
pub use error::{Result, TokenError};
pub use fasta::{FastaRecord, FastaRecordRef, FastaTokenizer};
pub use fastq::{FastqRecord, FastqRecordRef, FastqTokenizer};
pub use source::{ByteSource, ReaderSource};
