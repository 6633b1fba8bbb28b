//! Data consumer - views variables registered by the producer
//!
//! Usage:
//! ```bash
//! cargo run --example consumer
//! ```

use memshare_core::{Container, Element, LazyContainer, Registry};

fn describe(container: &LazyContainer) -> Result<String, memshare_core::Error> {
    let values = (0..container.length())
        .map(|i| match container.element_at(i)? {
            Element::Real(value) => Ok(value.to_string()),
            Element::Container(inner) => describe(&inner),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!("{} [{}]", container.metadata().kind(), values.join(", ")))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut registry = Registry::new();
    let views = registry.view("demo", &["x", "m", "l"])?;

    for (name, container) in &views {
        println!("{}: {}", name, describe(container)?);
    }

    println!("Viewing: {:?}", registry.list_viewed());
    registry.release_view("demo", &["x", "m", "l"])?;
    Ok(())
}
