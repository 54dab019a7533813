use criterion::{Criterion, criterion_group, criterion_main};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::hint::black_box;

use periphgen::pipeline::PipelineStep;
use periphgen::validation::{
    RegisterMappingValidator, StepValidator, ValidationResult, cross::check_all,
};

fn register_map(count: usize, fields_per_register: usize) -> Value {
    let registers: Vec<Value> = (0..count)
        .map(|idx| {
            let fields: Vec<Value> = (0..fields_per_register)
                .map(|bit| json!({"name": format!("F{bit}"), "start_bit": bit, "end_bit": bit}))
                .collect();
            json!({
                "name": format!("REG{idx}"),
                "address": format!("0x{:X}", idx * 4),
                "size": 32,
                "access": "RW",
                "reset_value": "0x0",
                "bit_fields": fields,
            })
        })
        .collect();
    json!({ "registers": registers })
}

fn bench_register_mapping(c: &mut Criterion) {
    let mut group = c.benchmark_group("register_mapping");

    for count in [16, 128, 512] {
        let data = register_map(count, 8);
        group.bench_function(format!("registers_{count}"), |b| {
            b.iter(|| {
                let mut result = ValidationResult::new();
                RegisterMappingValidator.validate_custom(black_box(&data), &mut result);
                result
            });
        });
    }

    let dense = register_map(64, 32);
    group.bench_function("dense_bit_fields", |b| {
        b.iter(|| {
            let mut result = ValidationResult::new();
            RegisterMappingValidator.validate_custom(black_box(&dense), &mut result);
            result
        });
    });

    group.finish();
}

fn bench_cross_validation(c: &mut Criterion) {
    let registers = register_map(128, 4);
    let names: Vec<Value> = (0..128)
        .map(|idx| json!({"name": format!("REG{idx}")}))
        .collect();
    let code: String = (0..128)
        .map(|idx| format!("Registers.Reg{idx}.DefineRegister(RegistersCollection, \"REG{idx}\");\n"))
        .collect();

    let mut outputs = BTreeMap::new();
    outputs.insert(PipelineStep::RegisterMapping, registers);
    outputs.insert(
        PipelineStep::ArchitecturePlanning,
        json!({"class_structure": {"class_name": "Timer32"}, "register_definitions": names}),
    );
    outputs.insert(
        PipelineStep::CodeGeneration,
        json!({"code": code, "peripheral_name": "Timer32"}),
    );

    c.bench_function("cross_validation_128_registers", |b| {
        b.iter(|| {
            let mut result = ValidationResult::new();
            check_all(black_box(&outputs), &mut result);
            result
        });
    });
}

criterion_group!(benches, bench_register_mapping, bench_cross_validation);
criterion_main!(benches);
