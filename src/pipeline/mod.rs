// Data pipeline: processing stages, columnar codecs and artifact layout

pub mod columnar;
pub mod processing;
pub mod storage;
