use castor_core::xattr::MAX_SEGMENTS;
use castor_core::AttributeCatalog;

/// Print the virtual attribute catalog and the listing size per segment count.
pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let catalog = AttributeCatalog::new();

    for name in catalog.names() {
        println!("{}", name);
    }
    println!();
    println!("catalog length:   {}", catalog.len());
    println!("segment span:     {}", catalog.segment_span());
    println!("summary span:     {}", catalog.summary_span());
    for segments in 0..=MAX_SEGMENTS {
        println!(
            "listing with {} segment(s): {} bytes",
            segments,
            catalog.reported_len(segments)
        );
    }

    Ok(())
}
