use std::env;
use std::path::PathBuf;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: {} <kernel_binary> <output_bootimage>", args[0]);
        eprintln!("Example: {} target/x86_64-unknown-none/debug/ferrite_os target/x86_64-unknown-none/debug/bootimage-ferrite_os.img", args[0]);
        std::process::exit(1);
    }

    let kernel_path = PathBuf::from(&args[1]);
    let bootimage_path = PathBuf::from(&args[2]);

    if !kernel_path.exists() {
        eprintln!("Error: Kernel binary not found: {:?}", kernel_path);
        std::process::exit(1);
    }

    println!("Creating bootimage...");
    println!("  Kernel: {:?}", kernel_path);
    println!("  Output: {:?}", bootimage_path);

    match bootloader::BiosBoot::new(&kernel_path).create_disk_image(&bootimage_path) {
        Ok(_) => {
            println!("Bootimage created successfully!");
        }
        Err(e) => {
            eprintln!("Error creating bootimage: {}", e);
            std::process::exit(1);
        }
    }
}
