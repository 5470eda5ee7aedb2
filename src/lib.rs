/*!
# Gene Annotation Dashboard

A browser-based gene-annotation service built in Rust.

## Overview

Users search a gene symbol; the service looks it up in its own database and,
when it is missing, asks the MyGene.info API, stores the first hit and
returns it. Signed-in users attach clone records (lab notes, antibody
metadata, pricing, tags) to each gene. A table view lists, searches and
filters the records and exports them to CSV or XLSX, and CSV files of genes
or clones can be bulk imported.

## Architecture

### Web Layer
- **Technologies**: Rust, axum, tower-http
- **Key Components**:
  - Gene lookup proxy - Pass-through of `/functions/v1/fetch-gene-data` to MyGene.info
  - REST API - Genes, clones, table, export and import endpoints
  - Sessions - Anonymous sign-in with a session cookie

### Core Layer
- Reconciliation - Local-first, external-fallback symbol resolution
- Gene cache - In-memory gene list refreshed after every mutation
- Import pipeline - Parse, all-or-nothing validation, row-by-row persist
- Flattening - One table row per clone, placeholder row for bare genes

### Data Persistence Layer
- JSON file database (default)
- Hosted PostgREST tables `genes` and `internal_fields`

## Modules

- **error**: Error taxonomy and HTTP mapping
- **config**: Environment configuration
- **model**: Gene and clone records
- **store**: Persistence backends
- **gateway**: External gene lookups
- **cache**: Gene list cache
- **reconcile**: Symbol resolution
- **clones**: Clone add, update and delete
- **auth**: Sessions and the current-user seam
- **import**: CSV import pipeline
- **table**: Flattening and filters
- **downloader**: Export functionality (CSV, XLSX)
- **app**: Routing and server startup

## REST API Endpoints

- `/functions/v1/fetch-gene-data` - Upstream lookup proxy (GET `?geneSymbol=` or POST `{geneSymbol}`)
- `/api/auth/anonymous`, `/api/auth/signout`, `/api/auth/me` - Session handling
- `/api/genes`, `/api/genes/search`, `/api/genes/resolve`, `/api/genes/{id}` - Genes
- `/api/genes/{id}/clones`, `/api/clones/{id}` - Clone records
- `/api/table`, `/api/table/export.csv`, `/api/table/export.xlsx` - Table view and export
- `/api/import/{kind}`, `/api/import/template/{kind}` - CSV import
*/

pub mod auth;
pub mod cache;
pub mod clones;
pub mod config;
pub mod downloader;
pub mod error;
pub mod gateway;
pub mod import;
pub mod model;
pub mod reconcile;
pub mod store;
pub mod table;

#[cfg(feature = "web")]
pub mod app;

pub use error::{AppError, AppResult};
