pub mod frame;

pub use frame::{parse_record, FrameParser, ParseError, Reading, FIELD_SEPARATOR, FRAME_DELIMITER};
