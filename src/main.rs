use clap::Parser;
use colored::*;
use ngx_audit::cli::{Cli, ColorChoice, Commands, DumpArgs, GenerateArgs, InspectArgs};
use ngx_audit::emitter::EmitterOptions;
use ngx_audit::{Diagnostics, Node, Parsed, Regexp, VariableValue};
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match cli.verbose {
        0 => EnvFilter::new("error"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Set up color output
    match cli.color {
        ColorChoice::Always => colored::control::set_override(true),
        ColorChoice::Never => colored::control::set_override(false),
        ColorChoice::Auto => {}
    }

    let result = match cli.command {
        Commands::Dump(args) => run_dump(args, cli.quiet),
        Commands::Inspect(args) => run_inspect(args, cli.quiet),
        Commands::Generate(args) => run_generate(args),
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "error".red().bold(), e);
        process::exit(1);
    }
}

fn load(args: &ngx_audit::cli::ParseArgs, quiet: bool) -> Result<Parsed, String> {
    if !args.input.exists() {
        return Err(format!("File not found: {}", args.input.display()));
    }

    let parsed =
        ngx_audit::parse_file(&args.input, args.parse_options()).map_err(|e| e.to_string())?;
    if !quiet {
        print_diagnostics(&parsed.diagnostics);
    }
    Ok(parsed)
}

fn run_dump(args: DumpArgs, quiet: bool) -> Result<(), String> {
    let parsed = load(&args.parse, quiet)?;
    let output = ngx_audit::emit(
        &parsed.tree,
        EmitterOptions {
            include_source_refs: args.source_refs,
            ..Default::default()
        },
    )
    .map_err(|e| e.to_string())?;
    print!("{}", output);
    Ok(())
}

fn run_inspect(args: InspectArgs, quiet: bool) -> Result<(), String> {
    let parsed = load(&args.parse, quiet)?;

    if args.json {
        let output = serde_json::json!({
            "file": args.parse.input.display().to_string(),
            "dump": parsed.dump,
            "nodes": node_json(parsed.tree.root())["children"].clone(),
            "warnings": parsed.diagnostics.warnings,
        });
        let text = serde_json::to_string_pretty(&output).map_err(|e| e.to_string())?;
        println!("{}", text);
    } else {
        println!("{}: {}", "Inspecting".cyan().bold(), args.parse.input.display());
        if parsed.dump {
            println!("{}", "Parsed as nginx -T dump".cyan());
        }
        println!();
        for child in parsed.tree.root().children() {
            print_node(child, 0);
        }
        println!();
        println!("{}", "Summary:".bold());
        println!("  Nodes: {}", parsed.tree.len() - 1);
        println!("  Warnings: {}", parsed.diagnostics.warnings.len());
    }

    Ok(())
}

fn run_generate(args: GenerateArgs) -> Result<(), String> {
    let regexp = Regexp::new(&args.pattern, !args.ignore_case).map_err(|e| e.to_string())?;
    for text in regexp
        .generate(args.placeholder, args.anchored, args.max_repeat)
        .take(args.limit)
    {
        println!("{}", text);
    }
    Ok(())
}

fn print_node(node: Node<'_>, depth: usize) {
    let pad = "  ".repeat(depth);
    let line = node
        .line()
        .map(|line| format!(":{}", line))
        .unwrap_or_default();
    println!(
        "{}{} {} {}{}",
        pad,
        node.name().bold(),
        node.args().join(" "),
        format!("[{}]", node.kind().label()).dimmed(),
        line.dimmed()
    );

    if node.provides_variables() {
        for variable in node.variables() {
            println!(
                "{}  {} ${} = {}",
                pad,
                "var".green(),
                variable.name().unwrap_or("?"),
                describe(&variable.value)
            );
        }
    }

    for child in node.children() {
        print_node(child, depth + 1);
    }
}

fn node_json(node: Node<'_>) -> serde_json::Value {
    let variables: Vec<serde_json::Value> = if node.provides_variables() {
        node.variables()
            .iter()
            .map(|v| {
                serde_json::json!({
                    "name": v.name(),
                    "value": describe(&v.value),
                })
            })
            .collect()
    } else {
        Vec::new()
    };

    serde_json::json!({
        "name": node.name(),
        "args": node.args(),
        "kind": node.kind(),
        "location": node.location(),
        "variables": variables,
        "children": node.children().map(node_json).collect::<Vec<_>>(),
    })
}

fn describe(value: &VariableValue) -> String {
    match value {
        VariableValue::Literal(text) => format!("{:?}", text),
        VariableValue::Capture(capture) if capture.group() == 0 => {
            format!("/{}/", capture.regexp().source())
        }
        VariableValue::Capture(capture) => format!(
            "group {} of /{}/ ({})",
            capture.group(),
            capture.regexp().source(),
            capture
        ),
        VariableValue::Entries(entries) => format!("one of {} entries", entries.len()),
        VariableValue::Unknown => "unknown".to_string(),
    }
}

fn print_diagnostics(diagnostics: &Diagnostics) {
    for warning in &diagnostics.warnings {
        eprintln!("{}: {}", "warning".yellow(), warning.message);
        if let Some(loc) = &warning.location {
            eprintln!("  --> {}", loc);
        }
    }
    if !diagnostics.is_empty() {
        eprintln!();
    }
}
