//! The administrative command line: provisioning mailboxes and inspecting
//! the metadata store.

mod list;
mod nuke;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use log::info;

pub use list::list;
pub use list::list_index;
pub use nuke::nuke;

use crate::{
    backend::TemplateProvisioner,
    config::Config,
    metadata::{SqliteMetadataStore, StoreKind},
    provision::provision_mailbox,
};

#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Args {
    /// Config file to use instead of the one in the XDG config directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Creates the special folders of a new mailbox.
    Provision {
        #[arg(long)]
        owner: String,
        /// Provision the public store instead of the private one.
        #[arg(long)]
        public: bool,
    },
    /// Prints the folder hierarchy the metadata store knows for a mailbox.
    List {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        public: bool,
        /// Print the backend URI index instead of the hierarchy.
        #[arg(long)]
        index: bool,
    },
    /// Deletes the metadata store with every mailbox in it.
    Nuke,
}

impl Command {
    /// The mailbox owner the command works for, if any.
    pub fn owner(&self) -> Option<&str> {
        match self {
            Command::Provision { owner, .. } | Command::List { owner, .. } => Some(owner),
            Command::Nuke => None,
        }
    }
}

fn store_kind(public: bool) -> StoreKind {
    if public {
        StoreKind::Public
    } else {
        StoreKind::Private
    }
}

fn open_store(config: &Config) -> Result<SqliteMetadataStore> {
    SqliteMetadataStore::open(config.metadata_db()).with_context(|| {
        format!(
            "opening metadata store {} failed",
            config.metadata_db().display()
        )
    })
}

pub fn run(args: &Args, config: &Config) -> Result<()> {
    match &args.command {
        Command::Provision { owner, public } => {
            let store = open_store(config)?;
            let provisioner = TemplateProvisioner::from_config(config.backends())?;
            let kind = store_kind(*public);
            let mailbox = provision_mailbox(&store, &provisioner, owner, kind)
                .with_context(|| format!("provisioning {kind:?} store of {owner} failed"))?;
            info!("provisioned {kind:?} store of {owner} with root {}", mailbox.root);
        }
        Command::List {
            owner,
            public,
            index,
        } => {
            let store = open_store(config)?;
            let out = &mut std::io::stdout().lock();
            if *index {
                list_index(&store, owner, store_kind(*public), out)?;
            } else {
                list(&store, owner, store_kind(*public), out)?;
            }
        }
        Command::Nuke => nuke(config)?,
    }
    Ok(())
}
