use std::path::PathBuf;

use coralc::{bytecode, compile_module, Config};

fn usage() -> ! {
    eprintln!(
        "usage:\n  coralc <input.wasm> [--dump] [--validate] [--threads] [--constants <n>]"
    );
    std::process::exit(2);
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut input: Option<PathBuf> = None;
    let mut config = Config::default();
    let mut dump = false;
    let mut validate = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--dump" => dump = true,
            "--validate" => validate = true,
            "--threads" => config.threads = true,
            "--constants" => {
                let Some(n) = args.next().and_then(|v| v.parse::<usize>().ok()) else {
                    usage();
                };
                config.max_retained_constants = n;
            }
            _ if arg.starts_with('-') => usage(),
            _ => {
                if input.replace(PathBuf::from(arg)).is_some() {
                    usage();
                }
            }
        }
    }
    let Some(input) = input else { usage() };

    if std::env::var("DUMP_BYTECODE").is_ok_and(|v| !v.is_empty()) {
        dump = true;
    }
    config.dump_bytecode = dump;

    let bytes = std::fs::read(&input).unwrap_or_else(|e| {
        eprintln!("error: failed to read {}: {}", input.display(), e);
        std::process::exit(2);
    });

    let module = match compile_module(&bytes, &config) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    println!(
        "{}: {} function(s), {} type(s), {} export(s)",
        input.display(),
        module.functions.len(),
        module.types.len(),
        module.exports.len()
    );
    for (i, f) in module.functions.iter().enumerate() {
        if f.bytecode.is_empty() {
            continue; // imported
        }
        println!(
            "func[{i}]: {} bytes, stack {} bytes, {} catch range(s)",
            f.bytecode.len(),
            f.required_stack_size,
            f.catch_table.len()
        );
        if dump {
            print!("{}", bytecode::dump(&f.bytecode));
            if let Some(debug) = &f.debug {
                for (value, slot) in &debug.constants {
                    println!("  const slot {}: {:?}", slot, value);
                }
                for (slot, start, end) in &debug.live_ranges {
                    println!("  slot {} live {}..{}", slot, start, end);
                }
            }
        }
        if validate {
            if let Err(msg) = bytecode::validate(&f.bytecode, f.required_stack_size) {
                eprintln!("func[{i}]: bytecode validation failed: {msg}");
                std::process::exit(1);
            }
        }
    }
    if validate {
        println!("bytecode validation passed");
    }
}
