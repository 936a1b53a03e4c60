//! Record → estimate → replay across module boundaries.

use alloy_primitives::{Address, B256};
use db_stochastic::{
    backend::to_address,
    generate::{uniform_registry, UniformConfig},
    replay::{self, ReplayConfig},
    workload::{record_transfers, TransferConfig},
    AccessClass, ArgOp, EstimationModel, EventProxy, EventRegistry, EventRegistryJson,
    MemoryBackend, Operation, StochasticError,
};
use tempfile::tempdir;

fn opcode_id(opcode: &str) -> usize {
    opcode.parse::<ArgOp>().unwrap().encode()
}

fn assert_stochastic(model: &EstimationModel) {
    for row in &model.stochastic_matrix {
        let sum: f64 = row.iter().sum();
        assert!(sum == 0.0 || (sum - 1.0).abs() < 1e-9, "row sum {sum}");
        assert!(row.iter().all(|&p| (0.0..=1.0).contains(&p)));
    }
}

#[test]
fn test_repeated_store_is_previous_everywhere() {
    let contract = Address::repeat_byte(0xaa);
    let key = B256::repeat_byte(0x01);
    let value = B256::repeat_byte(0x02);

    let mut registry = EventRegistry::new();
    registry.register_address_op(Operation::CreateAccount, &contract).unwrap();
    registry
        .register_value_op(Operation::SetState, &contract, &key, &value)
        .unwrap();
    registry
        .register_value_op(Operation::SetState, &contract, &key, &value)
        .unwrap();

    let first = ArgOp::new(
        Operation::SetState,
        AccessClass::PreviousValue,
        AccessClass::NewValue,
        AccessClass::NewValue,
    )
    .unwrap()
    .encode();
    let second = ArgOp::new(
        Operation::SetState,
        AccessClass::PreviousValue,
        AccessClass::PreviousValue,
        AccessClass::PreviousValue,
    )
    .unwrap()
    .encode();
    assert_eq!(registry.frequency(first), 1);
    assert_eq!(registry.frequency(second), 1);
    assert_eq!(registry.transition(opcode_id("CAn"), first), 1);
    assert!(registry.transition(first, second) > 0);

    let json = registry.to_json();
    let from = json.operations.iter().position(|op| op == "SSpnn").unwrap();
    let to = json.operations.iter().position(|op| op == "SSppp").unwrap();
    assert_eq!(json.transition_matrix[from][to], 1.0);
}

#[test]
fn test_files_round_trip() {
    let dir = tempdir().unwrap();
    let events_path = dir.path().join("events.json");
    let model_path = dir.path().join("simulation.json");

    let mut proxy = EventProxy::new(MemoryBackend::new(1));
    record_transfers(
        &TransferConfig {
            num_accounts: 400,
            num_transactions: 500,
            ..Default::default()
        },
        &mut proxy,
    )
    .unwrap();
    let registry = proxy.registry();
    registry.write_json(&events_path).unwrap();

    let events = EventRegistryJson::read_json(&events_path).unwrap();
    assert_eq!(events, registry.to_json());

    let model = EstimationModel::from_registry(&events).unwrap();
    model.write_json(&model_path).unwrap();
    assert_eq!(EstimationModel::read_json(&model_path).unwrap(), model);

    // each file rejects the other's format
    assert!(EstimationModel::read_json(&events_path).is_err());
    assert!(EventRegistryJson::read_json(&model_path).is_err());
}

#[test]
fn test_replayed_transfers_can_be_recorded_again() {
    let mut proxy = EventProxy::new(MemoryBackend::new(2));
    let recorded = record_transfers(
        &TransferConfig {
            num_accounts: 600,
            num_transactions: 1_000,
            conflict_factor: 0.3,
            ..Default::default()
        },
        &mut proxy,
    )
    .unwrap();
    let model = EstimationModel::from_registry(&proxy.registry().to_json()).unwrap();
    assert_stochastic(&model);

    let mut replayed = EventProxy::new(MemoryBackend::new(3));
    let summary = replay::run(
        &model,
        ReplayConfig {
            length: recorded.steps as usize,
            seed: 11,
            ..Default::default()
        },
        &mut replayed,
    )
    .unwrap();
    assert_eq!(summary.steps, recorded.steps);
    assert!(summary.transactions > 0);

    let registry = replayed.registry();
    assert_eq!(registry.num_events(), summary.steps);
    assert_eq!(
        registry.frequency(opcode_id("BT")),
        summary.count(Operation::BeginTransaction)
    );
    let synthetic = registry.to_json();
    let resynthesised = EstimationModel::from_registry(&synthetic).unwrap();
    assert_stochastic(&resynthesised);

    let (backend, _) = replayed.into_parts();
    assert!(backend.exists(&to_address(1)));
    assert_eq!(backend.stats().transactions, summary.transactions);
}

#[test]
fn test_uniform_model_replays() {
    let config = UniformConfig {
        num_contracts: 800,
        num_keys: 800,
        num_values: 800,
        ..Default::default()
    };
    let model = EstimationModel::from_registry(&uniform_registry(&config).to_json()).unwrap();
    assert_stochastic(&model);
    assert!(model.stationary_distribution.is_some());

    let mut backend = MemoryBackend::new(4);
    let summary = replay::run(
        &model,
        ReplayConfig {
            length: 20_000,
            ..Default::default()
        },
        &mut backend,
    )
    .unwrap();
    assert_eq!(summary.steps, 20_000);
    assert!(summary.transactions > 100);
    assert!(summary.count(Operation::SetState) > 0);
    assert!(backend.stats().writes > 0);
}

#[test]
fn test_small_recordings_are_not_replayable() {
    let mut proxy = EventProxy::new(MemoryBackend::new(5));
    record_transfers(
        &TransferConfig {
            num_accounts: 20,
            num_transactions: 50,
            ..Default::default()
        },
        &mut proxy,
    )
    .unwrap();
    let model = EstimationModel::from_registry(&proxy.registry().to_json()).unwrap();
    let err = replay::run(&model, ReplayConfig::default(), &mut MemoryBackend::new(6)).unwrap_err();
    assert!(matches!(err, StochasticError::CardinalityTooLow(_)));
}
