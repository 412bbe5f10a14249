use std::process::exit;

use clap::Parser;
use rusqlite::Connection;

use expense_tracker::{
    Error, create_default_accounts, get_all_users, get_or_create_profile, initialize_db,
    seed_system_categories,
};

/// A utility that adds the built-in categories and gives every existing user a profile and the
/// default accounts.
///
/// Running it more than once is safe.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database.
    #[arg(long)]
    db_path: String,
}

fn main() {
    let args = Args::parse();

    let connection = match Connection::open(&args.db_path) {
        Ok(connection) => connection,
        Err(error) => {
            eprintln!("Could not open the database at {}: {error}", args.db_path);
            exit(1);
        }
    };

    if let Err(error) = setup_data(&connection) {
        eprintln!("Could not set up data: {error}");
        exit(1);
    }
}

fn setup_data(connection: &Connection) -> Result<(), Error> {
    initialize_db(connection)?;

    let created = seed_system_categories(connection)?;
    println!("Created {created} system categories");

    for user in get_all_users(connection)? {
        get_or_create_profile(user.id, connection)?;
        let created = create_default_accounts(user.id, connection)?;
        println!(
            "Checked profile for {}, created {created} default accounts",
            user.username
        );
    }

    Ok(())
}
