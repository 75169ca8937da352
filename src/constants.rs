//! Artifact and table name constants shared by the writers, the aggregator and the mirror.
//! Downstream reports key on these names, so they must stay stable across releases.

// Artifact names (the `<artifact-name>` part of `<prefix><artifact-name>_<token>.<ext>`)
pub const SILVER_ARTIFACT: &str = "data_silver";
pub const GOLD_SUMMARY_ARTIFACT: &str = "metricas_resumo";
pub const GOLD_DETAIL_ARTIFACT: &str = "metricas_tabelas";
pub const GOLD_COMMENTS_ARTIFACT: &str = "principais_comentarios";

pub const PARQUET_EXT: &str = "parquet";
pub const CSV_EXT: &str = "csv";

// Summary metric names
pub const TOTAL_RESPOSTAS: &str = "total_respostas";
pub const TIMESTAMPS_UNICOS: &str = "timestamps_unicos";
pub const IDADES_FALTANTES: &str = "idades_faltantes";
pub const TOTAL_TRATAMENTOS: &str = "total_tratamentos";
pub const TRATAMENTOS_SIM: &str = "tratamentos_sim";
pub const TAXA_TRATAMENTO: &str = "taxa_tratamento";
pub const MEDIA_RISCO: &str = "media_risco";
pub const MEDIANA_RISCO: &str = "mediana_risco";
pub const DESVIO_PADRAO_RISCO: &str = "desvio_padrao_risco";

// Detail table columns
pub const COL_METRICA: &str = "metrica";
pub const COL_VALOR: &str = "valor";
pub const COL_QUANTIDADE: &str = "quantidade";
pub const COL_TABELA: &str = "tabela";
pub const COL_COLUNA: &str = "coluna";
pub const COL_PERCENTUAL_FALTANTE: &str = "percentual_faltante";
pub const COL_COMENTARIO: &str = "comentario";

/// Table tag of the per-column missing-value table
pub const TABLE_FALTANTES: &str = "faltantes";

// Relational mirror tables
pub const SUMMARY_TABLE: &str = "metrics_summary";
pub const DETAILS_TABLE: &str = "metrics_details";

/// Format of the run token: UTC, second precision
pub const RUN_TOKEN_FORMAT: &str = "%Y%m%dT%H%M%SZ";
