use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use gloam_vm::opcode::instruction::{encode, encode_abc, encode_abx, encode_asbx};
use gloam_vm::{FunctionPrototype, OpCode, UpvalueDescriptor, Value, Vm};
use std::hint::black_box;
use std::sync::Arc;

fn emit(proto: &mut FunctionPrototype, word: u32) {
    let line = proto.code.len() as u32 + 1;
    proto.add_instruction(word, line);
}

/// `local s = 0; for i = 1, n do s = s + i end; return s`
fn sum_loop(n: i64) -> Arc<FunctionPrototype> {
    let mut proto = FunctionPrototype::new("sum", "bench");
    proto.max_stack = 8;
    proto.add_upvalue(UpvalueDescriptor::register("_ENV", 0));
    let limit = proto.add_constant(Value::Integer(n)) as u16;
    emit(&mut proto, encode_asbx(OpCode::LoadI, 0, 1));
    emit(&mut proto, encode_abx(OpCode::LoadK, 1, limit));
    emit(&mut proto, encode_asbx(OpCode::LoadI, 2, 1));
    emit(&mut proto, encode_asbx(OpCode::LoadI, 4, 0));
    emit(&mut proto, encode_asbx(OpCode::ForPrep, 0, 1));
    emit(&mut proto, encode_abc(OpCode::Add, 4, 4, 3));
    emit(&mut proto, encode_asbx(OpCode::ForLoop, 0, -2));
    emit(&mut proto, encode_abc(OpCode::Return, 4, 2, 0));
    Arc::new(proto)
}

/// Naive recursive fibonacci through a global
fn fib(n: i16) -> Arc<FunctionPrototype> {
    let mut fib = FunctionPrototype::new("fib", "bench");
    fib.param_count = 1;
    fib.max_stack = 8;
    fib.add_upvalue(UpvalueDescriptor::enclosing("_ENV", 0));
    let name = fib.add_constant(Value::string("fib")) as u8;
    let one = fib.add_constant(Value::Integer(1)) as u8;
    let two = fib.add_constant(Value::Integer(2)) as u8;
    emit(&mut fib, encode(OpCode::Lt, 0, 0, two, false, true));
    emit(&mut fib, encode_asbx(OpCode::Jmp, 0, 1));
    emit(&mut fib, encode_abc(OpCode::Return, 0, 2, 0));
    emit(&mut fib, encode(OpCode::GetTabUp, 1, 0, name, false, true));
    emit(&mut fib, encode(OpCode::Sub, 2, 0, one, false, true));
    emit(&mut fib, encode_abc(OpCode::Call, 1, 2, 2));
    emit(&mut fib, encode(OpCode::GetTabUp, 2, 0, name, false, true));
    emit(&mut fib, encode(OpCode::Sub, 3, 0, two, false, true));
    emit(&mut fib, encode_abc(OpCode::Call, 2, 2, 2));
    emit(&mut fib, encode_abc(OpCode::Add, 1, 1, 2));
    emit(&mut fib, encode_abc(OpCode::Return, 1, 2, 0));

    let mut main = FunctionPrototype::new("main", "bench");
    main.max_stack = 4;
    main.add_upvalue(UpvalueDescriptor::register("_ENV", 0));
    let name = main.add_constant(Value::string("fib")) as u8;
    let child = main.add_prototype(fib) as u16;
    emit(&mut main, encode_abx(OpCode::Closure, 0, child));
    emit(&mut main, encode(OpCode::SetTabUp, 0, name, 0, true, false));
    emit(&mut main, encode_asbx(OpCode::LoadI, 1, n));
    emit(&mut main, encode_abc(OpCode::Call, 0, 2, 2));
    emit(&mut main, encode_abc(OpCode::Return, 0, 2, 0));
    Arc::new(main)
}

fn bench_sum_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("numeric_for");
    for n in [1_000i64, 100_000] {
        let proto = sum_loop(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &proto, |b, proto| {
            let mut vm = Vm::new();
            b.iter(|| black_box(vm.execute(proto.clone()).unwrap()));
        });
    }
    group.finish();
}

fn bench_fib(c: &mut Criterion) {
    let proto = fib(20);
    c.bench_function("fib_20", |b| {
        let mut vm = Vm::new();
        b.iter(|| black_box(vm.execute(proto.clone()).unwrap()));
    });
}

criterion_group!(benches, bench_sum_loop, bench_fib);
criterion_main!(benches);
