//! Basic board pipeline example.
//!
//! Discovers boards, calibrates the first one, and prints a few random
//! words. Runs against the scriptable stub driver; with the `vendor`
//! feature and boards attached, swap in `VendorDriver`.
//!
//! Run: `cargo run --example basic`

use std::sync::Arc;

use openqrng_core::{
    AcquisitionFacade, CalibrationController, DeviceRegistry, Error, StubDriver,
};

fn main() -> Result<(), Error> {
    let driver = Arc::new(StubDriver::with_boards(&[0x11, 0x22]));
    driver.set_quality(0, 0.97, 7.83);

    let registry = Arc::new(DeviceRegistry::new(driver));
    let count = registry.discover()?;
    println!("Boards found: {count}");
    for descriptor in registry.descriptors() {
        println!(
            "  [{}] id {:#06x} status {}",
            descriptor.index, descriptor.external_id, descriptor.calibration
        );
    }

    let controller = CalibrationController::new(Arc::clone(&registry));
    let status = controller.calibrate(0)?;
    println!("Calibration: {status}");
    let quality = controller.quality(0)?;
    println!(
        "Quality: q-factor {:.3}, h_min {:.3}",
        quality.q_factor, quality.min_entropy
    );

    let facade = AcquisitionFacade::new(registry);
    let words = facade.acquire(0, 8)?;
    print!("Random words:");
    for word in &words {
        print!(" {word:08x}");
    }
    println!();

    Ok(())
}
