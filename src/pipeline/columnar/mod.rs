//! Arrow/Parquet codecs for the bronze, silver and gold artifacts.

use arrow::array::RecordBatch;
use arrow::compute::concat_batches;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::{EnabledStatistics, WriterProperties, WriterVersion};

use crate::error::Result;

pub mod gold;
pub mod raw;
pub mod silver;

/// Parquet writer shared by every artifact the pipeline produces
#[derive(Debug, Clone)]
pub struct ParquetCodec {
    props: WriterProperties,
}

impl ParquetCodec {
    pub fn new() -> Result<Self> {
        Ok(Self {
            props: Self::build_writer_properties()?,
        })
    }

    fn build_writer_properties() -> Result<WriterProperties> {
        Ok(WriterProperties::builder()
            .set_writer_version(WriterVersion::PARQUET_2_0)
            .set_compression(Compression::ZSTD(ZstdLevel::try_new(3)?))
            // Survey columns are low-cardinality categoricals
            .set_dictionary_enabled(true)
            .set_statistics_enabled(EnabledStatistics::Chunk)
            .build())
    }

    /// Serialize a batch fully in memory; nothing is published on failure
    pub fn write_batch(&self, batch: &RecordBatch) -> Result<Bytes> {
        let mut buffer = Vec::new();
        {
            let mut writer =
                ArrowWriter::try_new(&mut buffer, batch.schema(), Some(self.props.clone()))?;
            writer.write(batch)?;
            writer.close()?;
        }
        Ok(Bytes::from(buffer))
    }

    /// Read every row group of a parquet file into one batch
    pub fn read_batch(&self, bytes: Bytes) -> Result<RecordBatch> {
        let builder = ParquetRecordBatchReaderBuilder::try_new(bytes)?;
        let schema = builder.schema().clone();
        let batches = builder.build()?.collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(concat_batches(&schema, &batches)?)
    }
}
