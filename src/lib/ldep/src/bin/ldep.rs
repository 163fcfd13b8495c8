use std::io::{self, BufRead, Read, Write};
use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use ldep::cli::Cli;
use ldep::error::LdepError;
use ldep::graph::{Context, LinkSetId, ObjIdx};
use ldep::{emit, listfile, scan, walk};

fn init_tracing(cli: &Cli) {
    let default_level = if cli.trace_link || cli.trace_unlink {
        "debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .init();
}

fn run(cli: Cli) -> Result<(), LdepError> {
    let mut ctx = Context::new();

    let mut first_file_objs: Option<Vec<ObjIdx>> = None;
    if cli.nm_files.is_empty() {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .map_err(|source| LdepError::Io {
                path: "<stdin>".to_string(),
                source,
            })?;
        let created = scan::scan_file(&mut ctx, "<stdin>", &text, cli.lenient)?;
        first_file_objs = Some(created);
    } else {
        for path in &cli.nm_files {
            let label = path.display().to_string();
            let text = std::fs::read_to_string(path).map_err(|source| LdepError::Io {
                path: label.clone(),
                source,
            })?;
            let created = scan::scan_file(&mut ctx, &label, &text, cli.lenient)?;
            if first_file_objs.is_none() {
                first_file_objs = Some(created);
            }
        }
    }

    ctx.fixup();
    ctx.gather_dangling_undefs();

    info!("looking for UNDEFINED symbols");
    for &(sym_id, _) in &ctx.graph[ctx.undefined_obj].exports {
        debug!(symbol = %ctx.symbols[sym_id].name, "undefined");
    }

    let last_app_obj = first_file_objs.and_then(|v| v.last().copied());
    let has_optional = !cli.optional_lists.is_empty();

    if let Some(sym_name) = &cli.main_symbol {
        let sym_id = ctx
            .symbol_id(sym_name)
            .ok_or_else(|| LdepError::MainSymbolNotFound {
                symbol: sym_name.clone(),
            })?;
        let definer = *ctx.symbols[sym_id]
            .exported_by
            .first()
            .ok_or_else(|| LdepError::MainSymbolUndefined {
                symbol: sym_name.clone(),
            })?;
        if definer == ctx.undefined_obj {
            return Err(LdepError::MainSymbolUndefined {
                symbol: sym_name.clone(),
            });
        }
        info!(symbol = %sym_name, object = %ctx.object_name(definer), "linking main application symbol");
        ctx.graph[definer].anchor = Some(LinkSetId::Application);
        walk::link(&mut ctx, definer, Some(sym_name));
    } else {
        let mut in_app_phase = true;
        for obj in ctx.objects().collect::<Vec<_>>() {
            if obj == ctx.undefined_obj {
                continue;
            }
            if ctx.graph[obj].anchor.is_none() {
                let set = if in_app_phase {
                    LinkSetId::Application
                } else {
                    LinkSetId::Optional
                };
                ctx.graph[obj].anchor = Some(set);
                walk::link(&mut ctx, obj, None);
            }
            if Some(obj) == last_app_obj {
                in_app_phase = false;
                if has_optional {
                    break;
                }
            }
        }
    }

    if cli.quiet {
        info!("OK, that's it for now");
        return Ok(());
    }

    for path in &cli.optional_lists {
        let text = std::fs::read_to_string(path).map_err(|source| LdepError::Io {
            path: path.display().to_string(),
            source,
        })?;
        listfile::process_list(&mut ctx, &path.display().to_string(), &text, true, cli.sloppy_unlink)?;
    }
    for path in &cli.exclude_lists {
        let text = std::fs::read_to_string(path).map_err(|source| LdepError::Io {
            path: path.display().to_string(),
            source,
        })?;
        listfile::process_list(&mut ctx, &path.display().to_string(), &text, false, cli.sloppy_unlink)?;
    }

    if cli.dump_symbols {
        for sym in &ctx.symbols {
            println!("{} {} size={}", sym.name, sym.type_code, sym.size);
        }
    }

    if cli.dump_deps {
        for obj in ctx.objects().collect::<Vec<_>>() {
            if obj == ctx.undefined_obj {
                continue;
            }
            println!("\nFlat dependency list for objects requiring: {}", ctx.object_name(obj));
            for dep in walk::collect_dependents(&ctx, obj) {
                if dep != obj {
                    println!("  {}", ctx.object_name(dep));
                }
            }
        }
    }

    info!("removing undefined symbols");
    walk::unlink_undefs(&mut ctx);

    if cli.check_multi_defs {
        for set in [LinkSetId::Application, LinkSetId::Optional] {
            for clash in walk::check_multiple_defs(&ctx, set) {
                eprintln!("multiply defined symbol in {} set: {clash}", set.title());
            }
        }
    }

    if cli.interactive {
        run_interactive(&ctx)?;
    }

    if let Some(path) = &cli.emit_script {
        let mut out = std::fs::File::create(path).map_err(|source| LdepError::Io {
            path: path.display().to_string(),
            source,
        })?;
        emit::write_script(&mut out, &ctx, cli.omit_application).map_err(|source| LdepError::Io {
            path: path.display().to_string(),
            source,
        })?;
    }
    if let Some(path) = &cli.emit_source {
        let mut out = std::fs::File::create(path).map_err(|source| LdepError::Io {
            path: path.display().to_string(),
            source,
        })?;
        emit::write_source(&mut out, &ctx, cli.omit_application).map_err(|source| LdepError::Io {
            path: path.display().to_string(),
            source,
        })?;
    }

    Ok(())
}

/// Minimal line-oriented query REPL: a bare name looks up a symbol, a
/// `[`-bracketed name looks up an object (`lib[member]` or `[member]`),
/// and a lone `.` quits. The cosmetic tree-dump helpers the original used
/// here are out of scope; this prints one summary line per result.
fn run_interactive(ctx: &Context) -> Result<(), LdepError> {
    let stdin = io::stdin();
    println!("Query database (enter single '.' to quit) for");
    println!(" A) Symbols, e.g. 'printf'");
    println!(" B) Objects, e.g. '[printf.o]', 'libc.a[printf.o]'");
    for line in stdin.lock().lines() {
        let line = line.map_err(|source| LdepError::Io {
            path: "<stdin>".to_string(),
            source,
        })?;
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query == "." {
            break;
        }
        if query.ends_with(']') {
            let matches = ctx.find_objects(query);
            if matches.is_empty() {
                println!("object '{query}' not found, try again.");
            } else {
                for obj in matches {
                    println!("{}: exports={} imports={}", ctx.object_name(obj), ctx.graph[obj].exports.len(), ctx.graph[obj].imports.len());
                }
            }
        } else {
            match ctx.symbol_id(query) {
                None => println!("Symbol '{query}' not found, try again"),
                Some(sym_id) => {
                    let sym = &ctx.symbols[sym_id];
                    println!(
                        "{} type={} exported_by={} imported_from={}",
                        sym.name,
                        sym.type_code,
                        sym.exported_by.len(),
                        sym.imported_from.len()
                    );
                }
            }
        }
        io::stdout().flush().ok();
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
