use serde::Serialize;
use std::time::Instant;
use weaver::vm::{ElemType, NullHost};
use weaver::{Op, Program, RuntimeConfig, Value, Vm};

#[derive(Serialize)]
struct BenchmarkResult {
    name: String,
    weaver_secs: f64,
    instructions: u64,
    /// Millions of instructions per second
    mips: f64,
    gc_cycles: u64,
    rust_time_secs: f64,
}

#[derive(Serialize)]
struct BenchmarkOutput {
    results: Vec<BenchmarkResult>,
}

// Spell programs

/// Sum 1..=n, leaving the total on the stack.
fn sum_loop(n: i32) -> Program {
    Program::new(vec![
        Op::ImmediateInt(0),
        Op::ImmediateInt(n),
        Op::Copy(0),
        Op::Brz(11),
        Op::Copy(1),
        Op::Copy(1),
        Op::AddI,
        Op::Set(1),
        Op::ImmediateInt(1),
        Op::SubI,
        Op::Jmp(2),
        Op::Pop(1),
    ])
}

/// Recursive fibonacci through Call/Return.
fn fibonacci(n: i32) -> Program {
    Program::new(vec![
        Op::ImmediateInt(n), // 0
        Op::Call(4),         // 1
        Op::Set(0),          // 2
        Op::Jmp(22),         // 3
        // fib: [n ret]
        Op::Copy(1),         // 4
        Op::ImmediateInt(2), // 5
        Op::LtI,             // 6
        Op::Brnz(20),        // 7
        Op::Copy(1),         // 8
        Op::ImmediateInt(1), // 9
        Op::SubI,            // 10
        Op::Call(4),         // 11
        Op::Set(0),          // 12: [n ret fib(n-1)]
        Op::Copy(2),         // 13
        Op::ImmediateInt(2), // 14
        Op::SubI,            // 15
        Op::Call(4),         // 16
        Op::Set(0),          // 17: [n ret fib(n-1) fib(n-2)]
        Op::AddI,            // 18
        Op::Return(1),       // 19
        Op::Copy(1),         // 20: n < 2
        Op::Return(1),       // 21
    ])
}

/// Fill an int array with i * i, then sum it.
fn array_sum(len: i32) -> Program {
    Program::new(vec![
        Op::ImmediateInt(len),     // 0
        Op::AllocA(ElemType::Int), // 1: [a]
        Op::ImmediateInt(len),     // 2: [a i]
        Op::Copy(0),               // 3
        Op::Brz(14),               // 4
        Op::ImmediateInt(1),       // 5
        Op::SubI,                  // 6: [a i-1]
        Op::Copy(1),               // 7
        Op::Copy(1),               // 8: [a i a i]
        Op::Copy(0),               // 9
        Op::Copy(0),               // 10
        Op::MulI,                  // 11: [a i a i i*i]
        Op::SetA,                  // 12
        Op::Jmp(3),                // 13
        // The exhausted counter doubles as the accumulator: [a acc]
        Op::Copy(1),               // 14
        Op::LenA,                  // 15: [a acc i]
        Op::Copy(0),               // 16
        Op::Brz(27),               // 17
        Op::ImmediateInt(1),       // 18
        Op::SubI,                  // 19
        Op::Copy(2),               // 20
        Op::Copy(1),               // 21
        Op::GetA,                  // 22: [a acc i v]
        Op::Copy(2),               // 23
        Op::AddI,                  // 24
        Op::Set(1),                // 25: [a acc+v i]
        Op::Jmp(16),               // 26
        Op::Pop(1),                // 27: [a acc]
    ])
}

/// Allocate and drop `count` small arrays.
fn alloc_churn(count: i32) -> Program {
    Program::new(vec![
        Op::ImmediateInt(count),
        Op::Copy(0),
        Op::Brz(9),
        Op::ImmediateInt(8),
        Op::AllocA(ElemType::Double),
        Op::Pop(1),
        Op::ImmediateInt(1),
        Op::SubI,
        Op::Jmp(1),
    ])
}

// Rust reference implementations

fn rust_sum_loop(n: i32) -> i32 {
    let mut sum: i32 = 0;
    for i in 1..=n {
        sum = sum.wrapping_add(i);
    }
    sum
}

fn rust_fibonacci(n: i32) -> i32 {
    if n < 2 {
        n
    } else {
        rust_fibonacci(n - 1) + rust_fibonacci(n - 2)
    }
}

fn rust_array_sum(len: i32) -> i32 {
    let data: Vec<i32> = (0..len).map(|i| i.wrapping_mul(i)).collect();
    data.iter().fold(0i32, |acc, v| acc.wrapping_add(*v))
}

fn rust_alloc_churn(count: i32) -> i32 {
    let mut kept = 0;
    for _ in 0..count {
        let v = std::hint::black_box(vec![0.0f64; 8]);
        kept += v.len() as i32 - 8;
    }
    kept
}

fn time_rust<F>(f: F) -> (f64, i32)
where
    F: FnOnce() -> i32,
{
    let start = Instant::now();
    let result = std::hint::black_box(f());
    (start.elapsed().as_secs_f64(), result)
}

fn run_weaver_benchmark(name: &str, program: &Program, expected: Option<i32>) -> (f64, u64, u64) {
    let mut vm = Vm::with_config(NullHost, RuntimeConfig::default());

    let start = Instant::now();
    let result = vm.run(program);
    let elapsed = start.elapsed().as_secs_f64();

    match result {
        Ok(summary) => {
            if let Some(expected) = expected {
                let top = vm.stack().as_slice().last().cloned();
                if top != Some(Value::Int(expected)) {
                    eprintln!(
                        "Weaver benchmark {} returned {:?}, expected {}",
                        name, top, expected
                    );
                }
            }
            (elapsed, summary.executed, summary.gc.cycles)
        }
        Err(fault) => {
            eprintln!("Weaver benchmark {} failed: {}", name, fault);
            (elapsed, vm.steps(), vm.gc_stats().cycles)
        }
    }
}

fn bench<F>(name: &str, program: Program, reference: F, check: bool) -> BenchmarkResult
where
    F: FnOnce() -> i32,
{
    let (rust_time, answer) = time_rust(reference);
    let expected = check.then_some(answer);
    let (secs, instructions, gc_cycles) = run_weaver_benchmark(name, &program, expected);
    let mips = if secs > 0.0 {
        instructions as f64 / secs / 1_000_000.0
    } else {
        0.0
    };
    BenchmarkResult {
        name: name.to_string(),
        weaver_secs: secs,
        instructions,
        mips,
        gc_cycles,
        rust_time_secs: rust_time,
    }
}

fn main() {
    let results = vec![
        bench("sum_loop", sum_loop(1_000_000), || rust_sum_loop(1_000_000), true),
        bench("fibonacci", fibonacci(25), || rust_fibonacci(25), true),
        bench("array_sum", array_sum(100_000), || rust_array_sum(100_000), true),
        // Allocation throughput only; the stack result is meaningless.
        bench("alloc_churn", alloc_churn(100_000), || rust_alloc_churn(100_000), false),
    ];

    let output = BenchmarkOutput { results };
    match serde_json::to_string_pretty(&output) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("failed to encode results: {}", e),
    }
}
