//! Data producer - registers variables in shared memory
//!
//! Run this first, then start the consumer while it waits.
//!
//! Usage:
//! ```bash
//! cargo run --example producer
//! ```

use memshare_core::{Matrix, Registry, Value};
use std::io::BufRead;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut registry = Registry::new();

    registry.register("demo", "x", &vec![1.0, 2.0, 3.0])?;
    registry.register(
        "demo",
        "m",
        &Matrix::new(3, 2, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])?,
    )?;
    registry.register(
        "demo",
        "l",
        &Value::List(vec![
            vec![10.0, 20.0].into(),
            Matrix::new(2, 2, vec![1.0, 0.0, 0.0, 1.0])?.into(),
        ]),
    )?;

    println!("Registered: {:?}", registry.list_owned());

    // Regions stay alive until the registry is dropped
    println!("\nVariables are shared. Press Enter to release them...");
    let _ = std::io::stdin().lock().lines().next();

    registry.release_all("demo", &["x", "m", "l"])?;
    println!("Released.");
    Ok(())
}
