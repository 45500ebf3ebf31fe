//! Agent hierarchy and commission cascade.
//!
//! Agents form an id-indexed arena with parent references by id; traversal
//! is a bounded fetch-by-id walk, never an object graph. On a winning bet
//! the cascade visits agent, parent and grandparent (at most three levels)
//! and records one commission row per level with a non-zero computed
//! amount. Every level earns off the full win amount; the sum across
//! levels is allowed to exceed any fixed pool.

use crate::errors::{EngineError, EngineResult};
use crate::ledger::types::{current_timestamp_ms, new_record_id};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Hierarchy walk stops here: agent -> master -> super-master.
pub const MAX_HIERARCHY_DEPTH: u8 = 3;

/// An agent in the commission hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    /// Commission rate in basis points (200 = 2%)
    pub commission_rate_bps: u32,
    /// Parent agent id; None for a top-level super-master
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub active: bool,
    /// Lifetime commission earned across all bets
    pub total_commission: u64,
    /// Commission earned but not yet consumed by a paid settlement
    pub pending_settlement: u64,
    pub created_at: u64,
}

impl Agent {
    pub fn new(id: impl Into<String>, name: impl Into<String>, commission_rate_bps: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            commission_rate_bps,
            parent_id: None,
            active: true,
            total_commission: 0,
            pending_settlement: 0,
            created_at: current_timestamp_ms(),
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }
}

/// One commission row per (winning bet, agent-in-hierarchy) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commission {
    pub id: String,
    pub bet_id: String,
    pub agent_id: String,
    /// 1 = direct agent, 2 = master, 3 = super-master
    pub level: u8,
    pub rate_bps: u32,
    pub amount: u64,
    /// Set only when the parent settlement is paid
    pub paid: bool,
    pub created_at: u64,
}

/// Commission records and the agent arena they cascade through.
pub struct CommissionLedger {
    agents: DashMap<String, Agent>,
    commissions: DashMap<String, Commission>,
}

impl CommissionLedger {
    pub fn new() -> Self {
        Self {
            agents: DashMap::new(),
            commissions: DashMap::new(),
        }
    }

    pub fn register_agent(&self, agent: Agent) -> EngineResult<()> {
        if let Some(parent_id) = &agent.parent_id {
            if !self.agents.contains_key(parent_id) {
                return Err(EngineError::not_found(format!(
                    "parent agent {}",
                    parent_id
                )));
            }
        }
        let id = agent.id.clone();
        match self.agents.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(EngineError::state_conflict(
                format!("agent {} already registered", id),
            )),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(agent);
                Ok(())
            }
        }
    }

    pub fn agent(&self, agent_id: &str) -> EngineResult<Agent> {
        self.agents
            .get(agent_id)
            .map(|a| a.clone())
            .ok_or_else(|| EngineError::not_found(format!("agent {}", agent_id)))
    }

    pub fn active_agents(&self) -> Vec<Agent> {
        self.agents
            .iter()
            .filter(|a| a.active)
            .map(|a| a.clone())
            .collect()
    }

    /// Walk the bettor's hierarchy and record commission for each level with
    /// a non-zero computed amount. A missing or inactive starting agent
    /// yields no rows; it is not an error.
    pub fn cascade(&self, bet_id: &str, win_amount: u64, agent_id: Option<&str>) -> Vec<Commission> {
        let mut created = Vec::new();
        let mut cursor = agent_id.map(str::to_string);
        let mut level: u8 = 1;

        while let Some(current_id) = cursor {
            if level > MAX_HIERARCHY_DEPTH {
                break;
            }

            let Some(mut agent) = self.agents.get_mut(&current_id) else {
                warn!(agent = %current_id, "commission cascade hit unknown agent, stopping walk");
                break;
            };

            // Each level earns off the full win amount, not a split pool.
            let amount = commission_amount(win_amount, agent.commission_rate_bps);
            if amount > 0 {
                let row = Commission {
                    id: new_record_id(),
                    bet_id: bet_id.to_string(),
                    agent_id: current_id.clone(),
                    level,
                    rate_bps: agent.commission_rate_bps,
                    amount,
                    paid: false,
                    created_at: current_timestamp_ms(),
                };
                agent.total_commission = agent.total_commission.saturating_add(amount);
                agent.pending_settlement = agent.pending_settlement.saturating_add(amount);
                self.commissions.insert(row.id.clone(), row.clone());
                debug!(
                    bet = bet_id,
                    agent = %current_id,
                    level,
                    amount,
                    "commission recorded"
                );
                created.push(row);
            }

            cursor = agent.parent_id.clone();
            level += 1;
        }

        created
    }

    /// Unpaid commission rows for an agent created within [start_ms, end_ms).
    pub fn unpaid_in_period(&self, agent_id: &str, start_ms: u64, end_ms: u64) -> Vec<Commission> {
        self.commissions
            .iter()
            .filter(|c| {
                c.agent_id == agent_id && !c.paid && c.created_at >= start_ms && c.created_at < end_ms
            })
            .map(|c| c.clone())
            .collect()
    }

    /// Mark the given commission rows paid; called when their parent
    /// settlement transitions to paid.
    pub fn mark_paid(&self, commission_ids: &[String]) {
        for id in commission_ids {
            if let Some(mut row) = self.commissions.get_mut(id) {
                row.paid = true;
            } else {
                warn!(commission = %id, "mark_paid on unknown commission row");
            }
        }
    }

    /// Reset the agent's unpaid carry after a settlement is paid out.
    pub fn reset_pending_settlement(&self, agent_id: &str) -> EngineResult<()> {
        let mut agent = self
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| EngineError::not_found(format!("agent {}", agent_id)))?;
        agent.pending_settlement = 0;
        Ok(())
    }

    pub fn commissions_for_bet(&self, bet_id: &str) -> Vec<Commission> {
        self.commissions
            .iter()
            .filter(|c| c.bet_id == bet_id)
            .map(|c| c.clone())
            .collect()
    }
}

impl Default for CommissionLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// win_amount * rate_bps / 10_000, widened to avoid intermediate overflow.
fn commission_amount(win_amount: u64, rate_bps: u32) -> u64 {
    ((win_amount as u128 * rate_bps as u128) / 10_000) as u64
}
