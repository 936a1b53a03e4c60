//! Human-readable summary of an estimation model.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::Result;
use crate::estimation::EstimationModel;
use crate::markov;
use crate::operation::Operation;

/// Number of states listed in the stationary-distribution table.
const TOP_STATES: usize = 20;

/// Derived quantities of a model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelReport {
    /// States with their stationary probability, most likely first.
    pub stationary: Vec<(String, f64)>,
    pub transactions_per_block: Option<f64>,
    pub blocks_per_sync_period: Option<f64>,
    /// Expected number of each non-scoping operation per transaction.
    pub operations_per_transaction: BTreeMap<Operation, f64>,
    /// Operations occurring in the model, in id order.
    pub operations: Vec<Operation>,
    /// Transition probabilities between operations with the argument
    /// classes collapsed; rows are indexed like `operations`.
    pub operation_matrix: Vec<Vec<f64>>,
    pub contracts: u64,
    pub keys: u64,
    pub values: u64,
    pub lambdas: [f64; 4],
}

impl ModelReport {
    /// Builds the report; uses the stored stationary distribution if present.
    pub fn from_model(model: &EstimationModel) -> Result<Self> {
        let arg_ops = model.decode_operations()?;
        let stationary = match &model.stationary_distribution {
            Some(pi) if pi.len() == arg_ops.len() => pi.clone(),
            _ => markov::stationary_distribution(&model.stochastic_matrix)?,
        };

        let mut per_op: BTreeMap<Operation, f64> = BTreeMap::new();
        for (arg_op, &p) in arg_ops.iter().zip(&stationary) {
            *per_op.entry(arg_op.op).or_insert(0.0) += p;
        }
        let mass = |op: Operation| per_op.get(&op).copied().unwrap_or(0.0);
        let ratio = |num: f64, den: f64| (den > 0.0).then(|| num / den);

        let transactions = mass(Operation::EndTransaction);
        let operations_per_transaction = if transactions > 0.0 {
            per_op
                .iter()
                .filter(|(op, _)| !op.is_scoping())
                .map(|(&op, &p)| (op, p / transactions))
                .collect()
        } else {
            BTreeMap::new()
        };

        let operations: Vec<Operation> = per_op.keys().copied().collect();
        let index: BTreeMap<Operation, usize> =
            operations.iter().enumerate().map(|(i, &op)| (op, i)).collect();
        let mut flows = vec![vec![0.0; operations.len()]; operations.len()];
        for (i, row) in model.stochastic_matrix.iter().enumerate() {
            let from = index[&arg_ops[i].op];
            for (j, &p) in row.iter().enumerate() {
                flows[from][index[&arg_ops[j].op]] += stationary[i] * p;
            }
        }
        let operation_matrix = markov::normalize_rows(&flows);

        let mut states: Vec<(String, f64)> = model
            .operations
            .iter()
            .cloned()
            .zip(stationary.iter().copied())
            .collect();
        states.sort_by(|a, b| b.1.total_cmp(&a.1));

        Ok(Self {
            stationary: states,
            transactions_per_block: ratio(transactions, mass(Operation::EndBlock)),
            blocks_per_sync_period: ratio(mass(Operation::EndBlock), mass(Operation::EndSyncPeriod)),
            operations_per_transaction,
            operations,
            operation_matrix,
            contracts: model.contract_stats.n,
            keys: model.key_stats.n,
            values: model.value_stats.n,
            lambdas: [
                model.contract_stats.lambda,
                model.key_stats.lambda,
                model.value_stats.lambda,
                model.snapshot_lambda,
            ],
        })
    }
}

fn optional(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"))
}

impl fmt::Display for ModelReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Index spaces")?;
        writeln!(f, "  {:<10} {:>12} {:>10}", "kind", "n", "lambda")?;
        let [contracts, keys, values, snapshots] = self.lambdas;
        writeln!(f, "  {:<10} {:>12} {:>10.4}", "contracts", self.contracts, contracts)?;
        writeln!(f, "  {:<10} {:>12} {:>10.4}", "keys", self.keys, keys)?;
        writeln!(f, "  {:<10} {:>12} {:>10.4}", "values", self.values, values)?;
        writeln!(f, "  {:<10} {:>12} {:>10.4}", "snapshots", "-", snapshots)?;

        writeln!(f)?;
        writeln!(f, "Scopes")?;
        writeln!(f, "  transactions per block:  {}", optional(self.transactions_per_block))?;
        writeln!(f, "  blocks per sync period:  {}", optional(self.blocks_per_sync_period))?;

        writeln!(f)?;
        writeln!(f, "Operations per transaction")?;
        for (op, count) in &self.operations_per_transaction {
            writeln!(f, "  {:<2} {:<20} {:>10.4}", op.mnemonic(), op.to_string(), count)?;
        }

        writeln!(f)?;
        writeln!(f, "Stationary distribution (top {TOP_STATES})")?;
        for (opcode, p) in self.stationary.iter().take(TOP_STATES) {
            writeln!(f, "  {opcode:<6} {p:>10.6}")?;
        }

        writeln!(f)?;
        writeln!(f, "Operation transitions")?;
        write!(f, "    ")?;
        for op in &self.operations {
            write!(f, " {:>5}", op.mnemonic())?;
        }
        writeln!(f)?;
        for (op, row) in self.operations.iter().zip(&self.operation_matrix) {
            write!(f, "  {}", op.mnemonic())?;
            for p in row {
                write!(f, " {p:>5.2}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
