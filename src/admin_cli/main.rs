use chrono::Utc;
use clap::{Parser, Subcommand};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseBackend, DatabaseConnection,
    EntityTrait, JsonValue, QueryFilter, Set, Statement,
};
use serde_json::{Map, Value as JsonValueSerde};
use std::fs;

use carwash::{
    api::validation,
    database::{self, models::users, types::UserRole},
    services::auth::{AuthService, normalize_email},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, verbatim_doc_comment)]
/// Command line administration for the car wash service.
/// Applies the schema, seeds reference data, inspects tables and creates users.
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Database maintenance.
    Db {
        #[command(subcommand)]
        db_command: DbCommand,
    },
    /// User management.
    User {
        #[command(subcommand)]
        user_command: UserCommand,
    },
}

#[derive(Subcommand, Debug)]
enum DbCommand {
    /// Applies dump/schema.sql and dump/seed.sql.
    Seed,
    /// Drops EVERY table of the public schema. Use with care!
    Wipe {
        /// Skip the confirmation check.
        #[arg(long)]
        yes: bool,
    },
    /// Runs a SELECT against a table and prints the rows as JSON.
    Query {
        /// Table to read.
        #[arg(short, long)]
        table: String,

        /// WHERE clause, e.g. "status = 'pending'".
        #[arg(short, long)]
        filter: Option<String>,

        /// Maximum number of rows.
        #[arg(short, long, default_value_t = 50)]
        limit: u64,
    },
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    /// Creates a user with a bcrypt-hashed password.
    Create {
        #[arg(short, long)]
        name: String,

        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,

        /// customer, staff or admin.
        #[arg(short, long, default_value = "customer")]
        role: String,

        /// Home location of a staff member.
        #[arg(long)]
        location_id: Option<i64>,
    },
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn statement(db: &DatabaseConnection, sql: impl Into<String>) -> Statement {
    Statement::from_string(db.get_database_backend(), sql.into())
}

async fn execute_sql_file(
    db: &DatabaseConnection,
    file_path: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Running script: {}", file_path);
    let sql = fs::read_to_string(file_path)?;
    for query in sql.split(';').filter(|s| !s.trim().is_empty()) {
        let trimmed_query = query.trim();

        if let Err(e) = db.execute(statement(db, trimmed_query)).await {
            let error_str = e.to_string();
            if error_str.contains("already exists") || error_str.contains("42P07") {
                println!(
                    "Object already exists, skipping: {}",
                    trimmed_query
                        .split_whitespace()
                        .take(3)
                        .collect::<Vec<_>>()
                        .join(" ")
                );
                continue;
            }
            return Err(e.into());
        }
    }
    println!("Script applied.");
    Ok(())
}

async fn wipe(db: &DatabaseConnection) -> Result<(), Box<dyn std::error::Error>> {
    if db.get_database_backend() != DatabaseBackend::Postgres {
        return Err("Wiping is only supported on PostgreSQL".into());
    }

    let tables: Vec<String> = db
        .query_all(statement(
            db,
            "SELECT tablename FROM pg_tables WHERE schemaname = 'public'",
        ))
        .await?
        .into_iter()
        .filter_map(|row| row.try_get::<String>("", "tablename").ok())
        .collect();

    if tables.is_empty() {
        println!("No tables found, the database is already empty.");
        return Ok(());
    }

    for table in tables {
        db.execute(statement(
            db,
            format!("DROP TABLE IF EXISTS \"{}\" CASCADE", table),
        ))
        .await?;
        println!("Dropped table: {}", table);
    }
    println!("Database wiped.");
    Ok(())
}

async fn query_table(
    db: &DatabaseConnection,
    table: &str,
    filter: Option<&str>,
    limit: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    if !is_identifier(table) {
        return Err(format!("Invalid table name: {}", table).into());
    }

    let mut query_str = format!("SELECT * FROM \"{}\"", table);
    if let Some(f) = filter {
        query_str.push_str(" WHERE ");
        query_str.push_str(f);
    }
    query_str.push_str(&format!(" ORDER BY id LIMIT {}", limit));

    println!("Running query: {}", query_str);
    let results = db.query_all(statement(db, query_str)).await?;

    let mut json_results: Vec<JsonValueSerde> = Vec::with_capacity(results.len());
    for row in results {
        let mut map = Map::new();
        for col in row.column_names() {
            let value: JsonValue = row.try_get("", col.as_str()).unwrap_or(JsonValue::Null);
            map.insert(col.to_string(), value);
        }
        json_results.push(JsonValueSerde::Object(map));
    }

    println!("{}", serde_json::to_string_pretty(&json_results)?);
    Ok(())
}

async fn create_user(
    db: &DatabaseConnection,
    name: &str,
    email: &str,
    password: &str,
    role: &str,
    location_id: Option<i64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let role: UserRole = role.parse()?;
    let name = validation::require_text("name", name, 120)?;
    let email = normalize_email(email);
    if !validation::validate_email(&email) {
        return Err(format!("Invalid email: {}", email).into());
    }
    validation::validate_password(password)?;

    let exists = users::Entity::find()
        .filter(users::Column::Email.eq(email.as_str()))
        .one(db)
        .await?
        .is_some();
    if exists {
        return Err(format!("User {} already exists", email).into());
    }

    let password_hash = AuthService::default().hash_password(password).await?;
    let user = users::ActiveModel {
        name: Set(name),
        email: Set(email),
        phone: Set(None),
        password_hash: Set(password_hash),
        role: Set(role.to_string()),
        location_id: Set(location_id),
        created_at: Set(Utc::now()),
        updated_at: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await?;

    println!("Created {} {} <{}> with id {}", user.role, user.name, user.email, user.id);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let db = database::connect().await?;

    match &cli.command {
        Commands::Db { db_command } => match db_command {
            DbCommand::Seed => {
                execute_sql_file(&db, "dump/schema.sql").await?;
                execute_sql_file(&db, "dump/seed.sql").await?;
                println!("Seeding finished.");
            }
            DbCommand::Wipe { yes } => {
                if !yes {
                    return Err("Refusing to wipe without --yes".into());
                }
                wipe(&db).await?;
            }
            DbCommand::Query {
                table,
                filter,
                limit,
            } => query_table(&db, table, filter.as_deref(), *limit).await?,
        },
        Commands::User { user_command } => match user_command {
            UserCommand::Create {
                name,
                email,
                password,
                role,
                location_id,
            } => create_user(&db, name, email, password, role, *location_id).await?,
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_table_names_only() {
        assert!(is_identifier("bookings"));
        assert!(is_identifier("wash_statuses"));
        assert!(!is_identifier("users; DROP TABLE users"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn parses_cli_arguments() {
        let cli = Cli::parse_from([
            "admin-cli", "user", "create", "--name", "Ana", "--email", "ana@example.com",
            "--password", "secret123", "--role", "staff",
        ]);
        match cli.command {
            Commands::User {
                user_command: UserCommand::Create { role, location_id, .. },
            } => {
                assert_eq!(role, "staff");
                assert_eq!(location_id, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
