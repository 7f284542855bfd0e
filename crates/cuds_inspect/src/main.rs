//! # cuds-inspect
//!
//! Read-only inspector for directory-backed CUDS files.
//!
//! ```text
//! cuds-inspect <DIR> list
//! cuds-inspect <DIR> lattice <NAME> [--nodes]
//! cuds-inspect <DIR> mesh <NAME>
//! cuds-inspect <DIR> particles <NAME> [--items]
//! cuds-inspect <DIR> table <NAME> [--rows]
//! ```
//!
//! `--json` switches every report to JSON on stdout. Logging goes to stderr
//! and follows `RUST_LOG`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cuds_io::{
    CudsFile, DataContainerTable, FileLattice, FileMesh, FileParticleContainer, OpenMode,
    StoreConfig,
};

#[derive(Parser)]
#[command(name = "cuds-inspect", about = "Inspect a CUDS store directory")]
struct Args {
    /// Store directory
    dir: PathBuf,

    /// Print reports as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List lattices, meshes, particle containers and data container tables
    List,
    /// Show lattice metadata and schema
    Lattice {
        name: String,
        /// Also dump every node carrying data
        #[arg(long)]
        nodes: bool,
    },
    /// Show mesh entity counts
    Mesh { name: String },
    /// Show a particle container
    Particles {
        name: String,
        /// Also dump every particle and bond
        #[arg(long)]
        items: bool,
    },
    /// Show a data container table
    Table {
        name: String,
        /// Also dump every row
        #[arg(long)]
        rows: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if !args.dir.is_dir() {
        anyhow::bail!("store directory not found: {}", args.dir.display());
    }

    // Append never truncates; there is no read-only mode.
    let config = StoreConfig::from_env(OpenMode::Append);
    let mut file = CudsFile::open(&args.dir, config)
        .with_context(|| format!("opening {}", args.dir.display()))?;
    info!(dir = %args.dir.display(), "inspecting store");

    let report = match &args.command {
        Command::List => list(&file)?,
        Command::Lattice { name, nodes } => {
            let lattice = file
                .get_lattice(name)
                .with_context(|| format!("opening lattice {name}"))?;
            lattice_report(&lattice, *nodes)?
        }
        Command::Mesh { name } => {
            let mesh = file
                .get_mesh(name)
                .with_context(|| format!("opening mesh {name}"))?;
            mesh_report(&mesh)?
        }
        Command::Particles { name, items } => {
            let pc = file
                .get_particle_container(name)
                .with_context(|| format!("opening particle container {name}"))?;
            particle_report(&pc, *items)?
        }
        Command::Table { name, rows } => {
            let table = file
                .get_data_table(name)
                .with_context(|| format!("opening data container table {name}"))?;
            table_report(&table, *rows)?
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_text(&report, 0);
    }
    file.close()?;
    Ok(())
}

fn list(file: &CudsFile) -> Result<Value> {
    Ok(json!({
        "lattices": file.lattice_names()?,
        "meshes": file.mesh_names()?,
        "particle_containers": file.particle_container_names()?,
        "data_tables": file.data_table_names()?,
    }))
}

fn lattice_report(lattice: &FileLattice, with_nodes: bool) -> Result<Value> {
    let schema = lattice.schema()?;
    let columns: Vec<Value> = schema
        .columns()
        .iter()
        .map(|c| json!({ "name": c.name.to_string(), "type": c.value_type.to_string() }))
        .collect();
    let occupied = lattice.iter_nodes(None)?.count();

    let mut report = json!({
        "name": lattice.name(),
        "type": lattice.lattice_type().name(),
        "base_vect": lattice.base_vect(),
        "size": lattice.size(),
        "origin": lattice.origin(),
        "schema_version": schema.version(),
        "mask_width": lattice.mask_width()?.bits(),
        "occupied_nodes": occupied,
        "columns": columns,
    });
    if with_nodes {
        let nodes = lattice
            .iter_nodes(None)?
            .map(|node| Ok(serde_json::to_value(node?)?))
            .collect::<Result<Vec<Value>>>()?;
        report["nodes"] = Value::Array(nodes);
    }
    Ok(report)
}

fn mesh_report(mesh: &FileMesh) -> Result<Value> {
    Ok(json!({
        "name": mesh.name(),
        "points": mesh.point_count()?,
        "edges": mesh.iter_edges(None)?.count(),
        "faces": mesh.iter_faces(None)?.count(),
        "cells": mesh.iter_cells(None)?.count(),
    }))
}

fn particle_report(pc: &FileParticleContainer, with_items: bool) -> Result<Value> {
    let mut report = json!({
        "name": pc.name(),
        "particles": pc.count_particles()?,
        "bonds": pc.count_bonds()?,
        "data": serde_json::to_value(pc.data()?)?,
    });
    if with_items {
        let particles = pc
            .iter_particles(None)?
            .map(|p| Ok(serde_json::to_value(p?)?))
            .collect::<Result<Vec<Value>>>()?;
        let bonds = pc
            .iter_bonds(None)?
            .map(|b| Ok(serde_json::to_value(b?)?))
            .collect::<Result<Vec<Value>>>()?;
        report["particle_list"] = Value::Array(particles);
        report["bond_list"] = Value::Array(bonds);
    }
    Ok(report)
}

fn table_report(table: &DataContainerTable, with_rows: bool) -> Result<Value> {
    let mut report = json!({
        "name": table.name(),
        "rows": table.len()?,
    });
    if with_rows {
        let rows = table
            .iter()?
            .map(|row| Ok(serde_json::to_value(row?)?))
            .collect::<Result<Vec<Value>>>()?;
        report["data"] = Value::Array(rows);
    }
    Ok(report)
}

fn print_text(value: &Value, indent: usize) {
    let pad = "  ".repeat(indent);
    match value {
        Value::Object(map) => {
            for (key, value) in map {
                if is_scalar(value) {
                    println!("{pad}{key}: {}", scalar_text(value));
                } else {
                    println!("{pad}{key}:");
                    print_text(value, indent + 1);
                }
            }
        }
        Value::Array(items) if items.iter().all(is_scalar) => {
            let parts: Vec<String> = items.iter().map(scalar_text).collect();
            println!("{pad}[{}]", parts.join(", "));
        }
        Value::Array(items) => {
            for item in items {
                println!("{pad}-");
                print_text(item, indent + 1);
            }
        }
        scalar => println!("{pad}{}", scalar_text(scalar)),
    }
}

fn is_scalar(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.iter().all(|v| !v.is_array() && !v.is_object()),
        Value::Object(_) => false,
        _ => true,
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(scalar_text).collect();
            format!("[{}]", parts.join(", "))
        }
        other => other.to_string(),
    }
}
