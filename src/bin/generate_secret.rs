use dotenv::dotenv;
use post_service::auth::TokenSigner;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::env;
use std::process;

fn generate_secret(length: usize) -> String {
    // random bytes hashed down to a fixed-size key
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..length).map(|_| rng.gen()).collect();

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hex::encode(hasher.finalize())
}

fn sign_token(account_arg: Option<&String>) {
    dotenv().ok();

    let account_id = match account_arg.and_then(|arg| arg.parse::<i64>().ok()) {
        Some(id) => id,
        None => {
            eprintln!("usage: generate-secret token <account_id>");
            process::exit(2);
        }
    };
    let secret_key = match env::var("SECRET_KEY") {
        Ok(key) if !key.trim().is_empty() => key,
        _ => {
            eprintln!("SECRET_KEY is not set; generate one first and add it to .env");
            process::exit(1);
        }
    };

    let token = TokenSigner::new(secret_key).sign(account_id);
    println!("Authorization: Bearer {}", token);
}

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.get(1).map(String::as_str) == Some("token") {
        sign_token(args.get(2));
        return;
    }

    let length = args
        .get(1)
        .and_then(|arg| arg.parse::<usize>().ok())
        .unwrap_or(64);
    let secret_key = generate_secret(length);

    println!("Generated SECRET_KEY:");
    println!("SECRET_KEY={}", secret_key);
    println!();
    println!("Copy this line to your .env file");
}
