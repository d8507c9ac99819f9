//! Password hashing utility for Authgate
//!
//! Prints an Argon2id hash suitable for the `password_hash` field of a
//! principal in the credentials file (`CREDENTIALS_FILE`).
//!
//! Usage:
//!   cargo run --bin hash-password
//!   cargo run --bin hash-password "MySecurePassword123!"
//!   cargo run --bin hash-password "MySecurePassword123!" alice +15550100 admin,user:add

use std::env;
use std::io::{self, Write};

use authgate_api::auth::{Argon2PasswordEncoder, PasswordEncoder};
use authgate_shared::{parse_authorities, Principal};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = env::args().skip(1);

    let password = if let Some(pwd) = args.next() {
        pwd
    } else {
        // Read from stdin so the password stays out of the process list
        print!("Enter password to hash: ");
        io::stdout().flush()?;

        let mut password = String::new();
        io::stdin().read_line(&mut password)?;
        password.trim().to_string()
    };

    if password.is_empty() {
        eprintln!("Error: Password cannot be empty");
        std::process::exit(1);
    }

    if password.len() < 12 {
        eprintln!("Warning: Password is less than 12 characters. Consider using a longer password.");
    }

    let password_hash = Argon2PasswordEncoder.encode(&password)?;

    let username = args.next().unwrap_or_else(|| "admin".to_string());
    let mut principal = Principal::new(username).with_password_hash(password_hash.clone());
    if let Some(mobile) = args.next() {
        principal = principal.with_mobile(mobile);
    }
    if let Some(authorities) = args.next() {
        principal.authorities = parse_authorities(&authorities);
    }

    println!("\n===========================================");
    println!("Password Hash (Argon2id):");
    println!("===========================================");
    println!("{password_hash}");
    println!("===========================================\n");

    println!("Credentials file entry:");
    println!("{}", serde_json::to_string_pretty(&principal)?);

    Ok(())
}
