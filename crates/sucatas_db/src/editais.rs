//! Primary-table operations.

use crate::error::{DbError, Result};
use crate::SucatasDb;
use sqlx::Row;
use sucatas_protocol::AuctionRecord;
use tracing::debug;

const UPSERT_EDITAL_SQL: &str = r#"
    INSERT INTO editais_leilao (
        id_interno, source_name, source_external_id, municipio, uf, ibge_code,
        lat, lon, data_publicacao, data_atualizacao, data_leilao, titulo,
        descricao, orgao, n_edital, objeto_resumido, tags, valor_estimado,
        quantidade_itens, tipo_leilao, modalidade, nome_leiloeiro, pncp_url,
        leiloeiro_url, storage_path, pdf_hash, versao_auditor
    ) VALUES (
        $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
        $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27
    )
    ON CONFLICT (id_interno) DO UPDATE SET
        source_name = EXCLUDED.source_name,
        source_external_id = EXCLUDED.source_external_id,
        municipio = EXCLUDED.municipio,
        uf = EXCLUDED.uf,
        ibge_code = EXCLUDED.ibge_code,
        lat = EXCLUDED.lat,
        lon = EXCLUDED.lon,
        data_publicacao = EXCLUDED.data_publicacao,
        data_atualizacao = EXCLUDED.data_atualizacao,
        data_leilao = EXCLUDED.data_leilao,
        titulo = EXCLUDED.titulo,
        descricao = EXCLUDED.descricao,
        orgao = EXCLUDED.orgao,
        n_edital = EXCLUDED.n_edital,
        objeto_resumido = EXCLUDED.objeto_resumido,
        tags = EXCLUDED.tags,
        valor_estimado = EXCLUDED.valor_estimado,
        quantidade_itens = EXCLUDED.quantidade_itens,
        tipo_leilao = EXCLUDED.tipo_leilao,
        modalidade = EXCLUDED.modalidade,
        nome_leiloeiro = EXCLUDED.nome_leiloeiro,
        pncp_url = EXCLUDED.pncp_url,
        leiloeiro_url = EXCLUDED.leiloeiro_url,
        storage_path = COALESCE(EXCLUDED.storage_path, editais_leilao.storage_path),
        pdf_hash = COALESCE(EXCLUDED.pdf_hash, editais_leilao.pdf_hash),
        versao_auditor = EXCLUDED.versao_auditor,
        updated_at = now()
"#;

impl SucatasDb {
    /// Upsert a VALID record keyed by `id_interno`. Non-destructive on
    /// conflict: `storage_path` and `pdf_hash` keep their existing values
    /// when the incoming row has none.
    ///
    /// The safety brake is checked first; at capacity every write fails
    /// closed and the caller must mark the run FAILED.
    pub async fn upsert_edital(&self, record: &AuctionRecord) -> Result<()> {
        self.check_capacity().await?;

        sqlx::query(UPSERT_EDITAL_SQL)
            .bind(&record.id_interno)
            .bind(record.source_name.map(|s| s.as_str()))
            .bind(&record.source_external_id)
            .bind(record.municipio.as_deref().unwrap_or_default())
            .bind(record.uf.as_deref().unwrap_or_default())
            .bind(record.ibge_code)
            .bind(record.lat)
            .bind(record.lon)
            .bind(&record.data_publicacao)
            .bind(&record.data_atualizacao)
            .bind(&record.data_leilao)
            .bind(record.titulo.as_deref().unwrap_or_default())
            .bind(record.descricao.as_deref().unwrap_or_default())
            .bind(record.orgao.as_deref().unwrap_or_default())
            .bind(&record.n_edital)
            .bind(&record.objeto_resumido)
            .bind(&record.tags)
            .bind(record.valor_estimado)
            .bind(record.quantidade_itens)
            .bind(record.tipo_leilao.map(|t| t.as_str()))
            .bind(&record.modalidade)
            .bind(&record.nome_leiloeiro)
            .bind(record.pncp_url.as_deref().unwrap_or_default())
            .bind(&record.leiloeiro_url)
            .bind(&record.storage_path)
            .bind(&record.pdf_hash)
            .bind(&record.versao_auditor)
            .execute(&self.pool)
            .await?;

        debug!(id_interno = %record.id_interno, "edital upserted");
        Ok(())
    }

    /// Current primary-table row count.
    pub async fn count_editais(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM editais_leilao")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("total"))
    }

    /// Does a record with this internal id already exist?
    pub async fn edital_exists(&self, id_interno: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM editais_leilao WHERE id_interno = $1")
            .bind(id_interno)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    pub(crate) async fn check_capacity(&self) -> Result<()> {
        let current = self.count_editais().await?;
        if current >= self.max_primary_rows {
            return Err(DbError::CapacityExceeded {
                current,
                limit: self.max_primary_rows,
            });
        }
        Ok(())
    }
}
