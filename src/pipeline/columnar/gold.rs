//! Gold codecs: the summary table, the stacked detail tables and the comments CSV.

use arrow::array::{ArrayRef, Float64Array, Int64Array, RecordBatch, StringArray};
use arrow::csv::WriterBuilder;
use arrow::datatypes::{DataType, Field, Schema};
use bytes::Bytes;
use std::sync::Arc;

use crate::constants::{
    COL_COLUNA, COL_COMENTARIO, COL_METRICA, COL_PERCENTUAL_FALTANTE, COL_QUANTIDADE, COL_TABELA,
    COL_VALOR,
};
use crate::error::Result;
use crate::pipeline::processing::aggregate::{DetailTable, MetricsSnapshot};

/// Two columns, `metrica` and `valor`; every value is text or null
pub fn summary_batch(snapshot: &MetricsSnapshot) -> Result<RecordBatch> {
    let rows = snapshot.summary.rows();
    let names: Vec<&str> = rows.iter().map(|(name, _)| *name).collect();
    let values: Vec<Option<String>> = rows.iter().map(|(_, value)| value.to_text()).collect();

    let schema = Schema::new(vec![
        Field::new(COL_METRICA, DataType::Utf8, false),
        Field::new(COL_VALOR, DataType::Utf8, true),
    ]);
    Ok(RecordBatch::try_new(
        Arc::new(schema),
        vec![
            Arc::new(StringArray::from(names)) as ArrayRef,
            Arc::new(StringArray::from(values)) as ArrayRef,
        ],
    )?)
}

/// One flattened detail row; unset cells are null in the stacked table
#[derive(Debug, Clone, Default, PartialEq)]
struct DetailRow {
    table: &'static str,
    label_column: &'static str,
    label: Option<String>,
    quantidade: Option<i64>,
    metrica: Option<&'static str>,
    percentual_faltante: Option<f64>,
}

fn detail_rows(snapshot: &MetricsSnapshot) -> Vec<DetailRow> {
    let mut rows = Vec::with_capacity(snapshot.detail_row_count());
    for dist in &snapshot.distributions {
        for row in &dist.rows {
            rows.push(DetailRow {
                table: dist.table.name(),
                label_column: dist.table.label_column(),
                label: row.category.clone(),
                quantidade: Some(row.count as i64),
                metrica: dist.table.metric_tag(),
                percentual_faltante: None,
            });
        }
    }
    for missing in &snapshot.missing {
        rows.push(DetailRow {
            table: DetailTable::Faltantes.name(),
            label_column: COL_COLUNA,
            label: Some(missing.column.clone()),
            quantidade: None,
            metrica: None,
            percentual_faltante: Some(missing.percent_missing).filter(|p| !p.is_nan()),
        });
    }
    rows
}

/// Column names in order of first appearance across the stacked tables.
/// Distribution tables contribute `<label>, quantidade, metrica, tabela`;
/// the missing-value table contributes `coluna, percentual_faltante, tabela`.
fn detail_column_order(snapshot: &MetricsSnapshot) -> Vec<&'static str> {
    let mut order: Vec<&'static str> = Vec::new();
    let mut push = |name: &'static str| {
        if !order.contains(&name) {
            order.push(name);
        }
    };
    for dist in &snapshot.distributions {
        push(dist.table.label_column());
        push(COL_QUANTIDADE);
        push(COL_METRICA);
        push(COL_TABELA);
    }
    push(COL_COLUNA);
    push(COL_PERCENTUAL_FALTANTE);
    push(COL_TABELA);
    order
}

/// All detail tables stacked into one batch, tagged by `tabela`
pub fn detail_batch(snapshot: &MetricsSnapshot) -> Result<RecordBatch> {
    let rows = detail_rows(snapshot);
    let mut fields = Vec::new();
    let mut arrays: Vec<ArrayRef> = Vec::new();

    for column in detail_column_order(snapshot) {
        let (data_type, array): (DataType, ArrayRef) = match column {
            COL_QUANTIDADE => {
                let values: Vec<Option<i64>> = rows.iter().map(|r| r.quantidade).collect();
                (DataType::Int64, Arc::new(Int64Array::from(values)) as ArrayRef)
            }
            COL_PERCENTUAL_FALTANTE => {
                let values: Vec<Option<f64>> = rows.iter().map(|r| r.percentual_faltante).collect();
                (DataType::Float64, Arc::new(Float64Array::from(values)) as ArrayRef)
            }
            COL_METRICA => {
                let values: Vec<Option<&str>> = rows.iter().map(|r| r.metrica).collect();
                (DataType::Utf8, Arc::new(StringArray::from(values)) as ArrayRef)
            }
            COL_TABELA => {
                let values: Vec<&str> = rows.iter().map(|r| r.table).collect();
                (DataType::Utf8, Arc::new(StringArray::from(values)) as ArrayRef)
            }
            label => {
                let values: Vec<Option<String>> = rows
                    .iter()
                    .map(|r| (r.label_column == label).then(|| r.label.clone()).flatten())
                    .collect();
                (DataType::Utf8, Arc::new(StringArray::from(values)) as ArrayRef)
            }
        };
        fields.push(Field::new(column, data_type, true));
        arrays.push(array);
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
}

/// Single-column `comentario` CSV with a header row
pub fn comments_csv(excerpts: &[String]) -> Result<Bytes> {
    let schema = Schema::new(vec![Field::new(COL_COMENTARIO, DataType::Utf8, false)]);
    let batch = RecordBatch::try_new(
        Arc::new(schema),
        vec![Arc::new(StringArray::from_iter_values(excerpts.iter())) as ArrayRef],
    )?;

    let mut buffer = Vec::new();
    {
        let mut writer = WriterBuilder::new().with_header(true).build(&mut buffer);
        writer.write(&batch)?;
    }
    Ok(Bytes::from(buffer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::aggregate::{
        DistributionRow, DistributionTable, MissingRow, SummaryMetrics,
    };
    use arrow::array::{Array, AsArray};
    use arrow::datatypes::Int64Type;

    fn snapshot() -> MetricsSnapshot {
        MetricsSnapshot {
            summary: SummaryMetrics {
                total_respostas: 3,
                media_risco: Some(2.0),
                desvio_padrao_risco: Some(f64::NAN),
                ..Default::default()
            },
            distributions: vec![
                DistributionTable {
                    table: DetailTable::FaixaEtaria,
                    rows: vec![
                        DistributionRow { category: Some("adult".into()), count: 2 },
                        DistributionRow { category: Some("child".into()), count: 1 },
                    ],
                },
                DistributionTable {
                    table: DetailTable::TamanhoEmpresa,
                    rows: vec![
                        DistributionRow { category: Some("6-25".into()), count: 2 },
                        DistributionRow { category: None, count: 1 },
                    ],
                },
            ],
            missing: vec![
                MissingRow { column: "age".into(), percent_missing: 0.0 },
                MissingRow { column: "comments".into(), percent_missing: 1.0 },
            ],
        }
    }

    #[test]
    fn test_summary_batch_is_textual() {
        let batch = summary_batch(&snapshot()).unwrap();
        assert_eq!(batch.num_rows(), 9);
        let valor = batch.column(1).as_string::<i32>();
        assert_eq!(valor.value(0), "3");
        // timestamps_unicos is absent
        assert!(valor.is_null(1));
        assert_eq!(valor.value(6), "2.0");
        // NaN deviation becomes null
        assert!(valor.is_null(8));
    }

    #[test]
    fn test_detail_batch_layout() {
        let batch = detail_batch(&snapshot()).unwrap();
        let names: Vec<String> = batch.schema().fields().iter().map(|f| f.name().clone()).collect();
        assert_eq!(
            names,
            vec![
                "faixa_etaria",
                "quantidade",
                "metrica",
                "tabela",
                "tamanho_empresa",
                "coluna",
                "percentual_faltante"
            ]
        );
        assert_eq!(batch.num_rows(), 6);

        let tabela = batch.column_by_name("tabela").unwrap().as_string::<i32>();
        assert_eq!(tabela.value(0), "faixa_etaria");
        assert_eq!(tabela.value(3), "tamanho_empresa");
        assert_eq!(tabela.value(5), "faltantes");

        let empresa = batch.column_by_name("tamanho_empresa").unwrap().as_string::<i32>();
        assert!(empresa.is_null(0));
        assert_eq!(empresa.value(2), "6-25");
        // explicit null category keeps its count
        assert!(empresa.is_null(3));
        let quantidade = batch
            .column_by_name("quantidade")
            .unwrap()
            .as_primitive::<Int64Type>();
        assert_eq!(quantidade.value(3), 1);
        assert!(quantidade.is_null(4));

        let metrica = batch.column_by_name("metrica").unwrap().as_string::<i32>();
        assert_eq!(metrica.value(0), "distribuicao_faixa_etaria");
        assert!(metrica.is_null(5));
    }

    #[test]
    fn test_detail_batch_without_distributions() {
        let mut snap = snapshot();
        snap.distributions.clear();
        let batch = detail_batch(&snap).unwrap();
        let names: Vec<String> = batch.schema().fields().iter().map(|f| f.name().clone()).collect();
        assert_eq!(names, vec!["coluna", "percentual_faltante", "tabela"]);
        assert_eq!(batch.num_rows(), 2);
    }

    #[test]
    fn test_comments_csv() {
        let csv = comments_csv(&["first, with comma".to_string(), "second one".to_string()]).unwrap();
        let text = String::from_utf8(csv.to_vec()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["comentario", "\"first, with comma\"", "second one"]);
    }
}
