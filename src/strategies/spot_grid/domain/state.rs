use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::core::types::{OrderId, OrderRef, OrderSide};

/// 每个tick根据挂单集合判定的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GridPhase {
    /// 卖单仍在，等待成交
    AwaitingFill,
    /// 只剩买单（仓位已清空），尝试上移参考价追价
    Chase,
    /// 两侧均无挂单（首次启动或已清空）
    Bootstrap,
    /// 有挂单消失（成交或取消）
    Reconcile,
}

/// 本tick的处理结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TickOutcome {
    Waiting,
    /// 追价条件未满足
    ChaseNotTriggered,
    /// 风控拦截追价
    RiskGuardHalted,
    /// 资金未解锁，本轮放弃重建
    SettlementAborted,
    Rebuilt {
        phase: GridPhase,
        reference_price: Decimal,
        buy_orders: usize,
        sell_orders: usize,
    },
}

/// 引擎挂出且仍在跟踪的订单，按方向分开
#[derive(Debug, Default, Clone)]
pub struct TrackedOrders {
    buys: BTreeMap<OrderId, OrderRef>,
    sells: BTreeMap<OrderId, OrderRef>,
}

impl TrackedOrders {
    pub fn insert(&mut self, order: OrderRef) {
        match order.side {
            OrderSide::Buy => self.buys.insert(order.id, order),
            OrderSide::Sell => self.sells.insert(order.id, order),
        };
    }

    pub fn get(&self, id: OrderId) -> Option<&OrderRef> {
        self.buys.get(&id).or_else(|| self.sells.get(&id))
    }

    pub fn clear(&mut self) {
        self.buys.clear();
        self.sells.clear();
    }

    pub fn buys(&self) -> impl Iterator<Item = &OrderRef> {
        self.buys.values()
    }

    pub fn sells(&self) -> impl Iterator<Item = &OrderRef> {
        self.sells.values()
    }

    pub fn buy_count(&self) -> usize {
        self.buys.len()
    }

    pub fn sell_count(&self) -> usize {
        self.sells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buys.is_empty() && self.sells.is_empty()
    }

    /// 已跟踪但不在当前活跃列表中的订单，按ID升序
    pub fn vanished(&self, open_ids: &[OrderId]) -> Vec<OrderId> {
        let open: BTreeSet<OrderId> = open_ids.iter().copied().collect();
        self.buys
            .keys()
            .chain(self.sells.keys())
            .filter(|id| !open.contains(id))
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn phase(&self, vanished: &[OrderId]) -> GridPhase {
        if !vanished.is_empty() {
            GridPhase::Reconcile
        } else if !self.sells.is_empty() {
            GridPhase::AwaitingFill
        } else if !self.buys.is_empty() {
            GridPhase::Chase
        } else {
            GridPhase::Bootstrap
        }
    }
}

/// 引擎状态快照
#[derive(Debug, Clone, Serialize)]
pub struct GridSnapshot {
    pub pair: String,
    pub reference_price: Option<Decimal>,
    pub last_phase: Option<GridPhase>,
    pub buy_orders: Vec<OrderRef>,
    pub sell_orders: Vec<OrderRef>,
}
