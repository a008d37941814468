//! Dataset model, loading, and refinement.

pub mod dates;
pub mod frame;
pub mod refine;
pub mod source;

pub use frame::{
    Cell, Column, ColumnData, ColumnKind, RawColumn, RawDataset, RefinedDataset, RowIndex,
};
pub use refine::refine;
pub use source::{
    CsvSource, DatasetSource, DirectorySource, FileFormat, InMemorySource, parse_delimited,
    parse_json_records,
};
