use super::{date_str, parse_date, parse_opt_date, CommissionStore};
use crate::{
    error::CommissionResult,
    money::{Bps, Money},
    rate_resolution::{CommissionGrid, GridRepository},
};
use rusqlite::{params, Row};

const GRID_COLUMNS: &str = "grid_id, tenant_id, grid_table, product_category, provider,
     min_premium, max_premium, base_bps, reward_bps, bonus_bps,
     effective_from, effective_to, version";

impl CommissionStore {
    pub fn upsert_grid(&self, g: &CommissionGrid) -> CommissionResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO commission_grid (
                grid_id, tenant_id, grid_table, product_category, provider,
                min_premium, max_premium, base_bps, reward_bps, bonus_bps,
                effective_from, effective_to, version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                g.grid_id,
                g.tenant_id,
                g.grid_table,
                g.product_category,
                g.provider,
                g.min_premium.map(Money::minor),
                g.max_premium.map(Money::minor),
                g.base_rate.0,
                g.reward_rate.0,
                g.bonus_rate.0,
                date_str(&g.effective_from),
                g.effective_to.as_ref().map(date_str),
                g.version,
            ],
        )?;
        Ok(())
    }

    pub fn grids_for_tenant(&self, tenant_id: &str) -> CommissionResult<Vec<CommissionGrid>> {
        let sql = format!("SELECT {GRID_COLUMNS} FROM commission_grid WHERE tenant_id = ?1");
        let mut stmt = self.conn.prepare(&sql)?;
        let grids = stmt
            .query_map(params![tenant_id], grid_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(grids)
    }
}

impl GridRepository for CommissionStore {
    fn grids_for(&self, tenant_id: &str, product_category: &str) -> CommissionResult<Vec<CommissionGrid>> {
        let sql = format!(
            "SELECT {GRID_COLUMNS} FROM commission_grid
             WHERE tenant_id = ?1 AND product_category = ?2"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let grids = stmt
            .query_map(params![tenant_id, product_category], grid_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(grids)
    }
}

fn grid_from_row(row: &Row<'_>) -> rusqlite::Result<CommissionGrid> {
    Ok(CommissionGrid {
        grid_id:          row.get(0)?,
        tenant_id:        row.get(1)?,
        grid_table:       row.get(2)?,
        product_category: row.get(3)?,
        provider:         row.get(4)?,
        min_premium:      row.get::<_, Option<i64>>(5)?.map(Money),
        max_premium:      row.get::<_, Option<i64>>(6)?.map(Money),
        base_rate:        Bps(row.get(7)?),
        reward_rate:      Bps(row.get(8)?),
        bonus_rate:       Bps(row.get(9)?),
        effective_from:   parse_date(row, 10)?,
        effective_to:     parse_opt_date(row, 11)?,
        version:          row.get(12)?,
    })
}
