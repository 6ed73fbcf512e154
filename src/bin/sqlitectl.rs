//! sqlitectl - Command line client for sqliteserver nodes
//!
//! Usage:
//!   sqlitectl query "SELECT * FROM t"          - Run a statement
//!   sqlitectl query "SELECT ?1" --params '[1]' - Run with parameters
//!   sqlitectl health                           - Check a node is up
//!   sqlitectl register --port :5051            - Register a follower

use std::fmt;

use clap::{Parser, Subcommand};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

/// sqliteserver Control Tool
#[derive(Parser)]
#[command(name = "sqlitectl")]
#[command(about = "Query and manage sqliteserver nodes", long_about = None)]
struct Cli {
    /// Node base URL
    #[arg(short, long, default_value = "http://127.0.0.1:5050")]
    endpoint: String,

    /// Shared secret sent in the `secret` header
    #[arg(short, long, default_value = "secret")]
    secret: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a SQL statement
    Query {
        /// SQL text
        sql: String,
        /// Positional parameters as a JSON array
        #[arg(short, long)]
        params: Option<String>,
    },
    /// Check that the node answers
    Health,
    /// Register a follower with the node
    Register {
        /// Follower address
        #[arg(long, default_value = "http://localhost")]
        address: String,
        /// Follower port, with its leading colon
        #[arg(long)]
        port: String,
    },
}

// ============ API Types ============

#[derive(Debug, Serialize)]
struct QueryRequest {
    #[serde(rename = "sqlQuery")]
    sql_query: String,
    params: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct QueryReply {
    #[serde(default)]
    result: Option<Vec<Row>>,
    #[serde(default)]
    error: String,
}

/// One result row, columns kept in the order the server sent them
#[derive(Debug, Default, PartialEq)]
struct Row(Vec<(String, serde_json::Value)>);

impl Row {
    fn get(&self, column: &str) -> Option<&serde_json::Value> {
        self.0.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RowVisitor;

        impl<'de> Visitor<'de> for RowVisitor {
            type Value = Row;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a result row object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Row, A::Error> {
                let mut columns = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry()? {
                    columns.push(entry);
                }
                Ok(Row(columns))
            }
        }

        deserializer.deserialize_map(RowVisitor)
    }
}

#[derive(Debug, Serialize)]
struct RegisterRequest {
    address: String,
    port: String,
}

// ============ Main ============

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let endpoint = cli.endpoint.trim_end_matches('/').to_string();

    let result = match &cli.command {
        Commands::Query { sql, params } => {
            run_query(&endpoint, &cli.secret, sql, params.as_deref()).await
        }
        Commands::Health => health(&endpoint, &cli.secret).await,
        Commands::Register { address, port } => {
            register(&endpoint, &cli.secret, address, port).await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

// ============ Commands ============

async fn run_query(
    endpoint: &str,
    secret: &str,
    sql: &str,
    params: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let params: Vec<serde_json::Value> = match params {
        Some(raw) => serde_json::from_str(raw)?,
        None => Vec::new(),
    };

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/query", endpoint))
        .header("secret", secret)
        .json(&QueryRequest {
            sql_query: sql.to_string(),
            params,
        })
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(format!("API error: {}", response.status()).into());
    }

    let reply: QueryReply = response.json().await?;
    if !reply.error.is_empty() {
        return Err(reply.error.into());
    }

    let rows = reply.result.unwrap_or_default();
    if rows.is_empty() {
        println!("(0 rows)");
        return Ok(());
    }

    for line in render_table(&rows) {
        println!("{}", line);
    }
    println!("({} rows)", rows.len());

    Ok(())
}

/// Header, rule and one line per row; columns follow the first row
fn render_table(rows: &[Row]) -> Vec<String> {
    let columns: Vec<&str> = match rows.first() {
        Some(first) => first.0.iter().map(|(c, _)| c.as_str()).collect(),
        None => return Vec::new(),
    };

    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(columns.iter().map(|c| format!("{:<20}", c)).collect());
    lines.push("-".repeat(20 * columns.len()));
    for row in rows {
        lines.push(
            columns
                .iter()
                .map(|c| format!("{:<20}", display_value(row.get(c))))
                .collect(),
        );
    }
    lines
}

fn display_value(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => "NULL".to_string(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

async fn health(endpoint: &str, secret: &str) -> Result<(), Box<dyn std::error::Error>> {
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/health", endpoint))
        .header("secret", secret)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(format!("API error: {}", response.status()).into());
    }

    println!("{} {}", endpoint, response.text().await?);
    Ok(())
}

async fn register(
    endpoint: &str,
    secret: &str,
    address: &str,
    port: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/follower", endpoint))
        .header("secret", secret)
        .json(&RegisterRequest {
            address: address.to_string(),
            port: port.to_string(),
        })
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(format!("API error: {}", response.status()).into());
    }

    println!("Registered follower {}{} with {}", address, port, endpoint);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_keeps_column_order() {
        let reply: QueryReply = serde_json::from_str(
            r#"{"result":[{"zeta":1,"alpha":"a","mid":null}],"error":""}"#,
        )
        .unwrap();
        let rows = reply.result.unwrap();
        let columns: Vec<&str> = rows[0].0.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(columns, vec!["zeta", "alpha", "mid"]);

        let table = render_table(&rows);
        assert!(table[0].starts_with("zeta"));
        assert!(table[0].trim_end().ends_with("mid"));
        assert!(table[2].trim_end().ends_with("NULL"));
    }

    #[test]
    fn test_failed_reply() {
        let reply: QueryReply =
            serde_json::from_str(r#"{"result":null,"error":"no such table: t"}"#).unwrap();
        assert!(reply.result.is_none());
        assert_eq!(reply.error, "no such table: t");
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["sqlitectl", "health"]).unwrap();
        assert_eq!(cli.endpoint, "http://127.0.0.1:5050");
        assert_eq!(cli.secret, "secret");

        let cli = Cli::try_parse_from([
            "sqlitectl", "--secret", "s3", "query", "SELECT ?1", "--params", "[1]",
        ])
        .unwrap();
        assert_eq!(cli.secret, "s3");
        assert!(matches!(cli.command, Commands::Query { params: Some(_), .. }));
    }
}
