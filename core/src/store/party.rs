use super::{parse_col, CommissionStore};
use crate::{
    error::CommissionResult,
    money::Bps,
    party_resolver::{CommissionTier, Party, PartyRepository},
    types::PartyKind,
};
use rusqlite::{params, OptionalExtension, Row};

const PARTY_COLUMNS: &str = "party_id, tenant_id, kind, name, code, commission_tier_id, override_bps";

impl CommissionStore {
    pub fn upsert_tier(&self, t: &CommissionTier) -> CommissionResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO commission_tier (tier_id, tenant_id, name, base_bps)
             VALUES (?1, ?2, ?3, ?4)",
            params![t.tier_id, t.tenant_id, t.name, t.base_percentage.0],
        )?;
        Ok(())
    }

    pub fn upsert_party(&self, p: &Party) -> CommissionResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO party (
                party_id, tenant_id, kind, name, code, commission_tier_id, override_bps
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                p.party_id,
                p.tenant_id,
                p.kind.as_str(),
                p.name,
                p.code,
                p.commission_tier_id,
                p.override_percentage.map(|b| b.0),
            ],
        )?;
        Ok(())
    }

    pub fn tiers_for_tenant(&self, tenant_id: &str) -> CommissionResult<Vec<CommissionTier>> {
        let mut stmt = self.conn.prepare(
            "SELECT tier_id, tenant_id, name, base_bps FROM commission_tier WHERE tenant_id = ?1",
        )?;
        let tiers = stmt
            .query_map(params![tenant_id], tier_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tiers)
    }

    pub fn parties_for_tenant(&self, tenant_id: &str) -> CommissionResult<Vec<Party>> {
        let sql = format!("SELECT {PARTY_COLUMNS} FROM party WHERE tenant_id = ?1");
        let mut stmt = self.conn.prepare(&sql)?;
        let parties = stmt
            .query_map(params![tenant_id], party_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(parties)
    }
}

impl PartyRepository for CommissionStore {
    fn party(&self, tenant_id: &str, kind: PartyKind, party_id: &str) -> CommissionResult<Option<Party>> {
        let sql = format!(
            "SELECT {PARTY_COLUMNS} FROM party
             WHERE tenant_id = ?1 AND kind = ?2 AND party_id = ?3"
        );
        let party = self
            .conn
            .query_row(&sql, params![tenant_id, kind.as_str(), party_id], party_from_row)
            .optional()?;
        Ok(party)
    }

    fn tier(&self, tenant_id: &str, tier_id: &str) -> CommissionResult<Option<CommissionTier>> {
        let tier = self
            .conn
            .query_row(
                "SELECT tier_id, tenant_id, name, base_bps FROM commission_tier
                 WHERE tenant_id = ?1 AND tier_id = ?2",
                params![tenant_id, tier_id],
                tier_from_row,
            )
            .optional()?;
        Ok(tier)
    }
}

fn tier_from_row(row: &Row<'_>) -> rusqlite::Result<CommissionTier> {
    Ok(CommissionTier {
        tier_id:         row.get(0)?,
        tenant_id:       row.get(1)?,
        name:            row.get(2)?,
        base_percentage: Bps(row.get(3)?),
    })
}

fn party_from_row(row: &Row<'_>) -> rusqlite::Result<Party> {
    Ok(Party {
        party_id:            row.get(0)?,
        tenant_id:           row.get(1)?,
        kind:                parse_col::<PartyKind>(row, 2)?,
        name:                row.get(3)?,
        code:                row.get(4)?,
        commission_tier_id:  row.get(5)?,
        override_percentage: row.get::<_, Option<i64>>(6)?.map(Bps),
    })
}
