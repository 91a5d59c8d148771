use std::io::Write;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // For each hid.bin file in our test/data directory, create one basic test function
    // that opens a device with that report descriptor and decodes an all-zero report
    // for each of its reports
    let datadir: PathBuf = [concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data")].iter().collect();
    let out_dir = std::env::var_os("OUT_DIR").unwrap();
    let dest_path = PathBuf::from(&out_dir).join("test-report-descriptors.rs");
    let mut file = std::fs::File::create(dest_path)?;

    println!("cargo:rerun-if-changed=tests/data");

    writeln!(file, "use hidhost::*;")?;
    writeln!(file)?;

    std::fs::read_dir(datadir)
        .unwrap()
        .flatten()
        .filter(|rdesc| rdesc.file_name().to_string_lossy().ends_with(".hid.bin"))
        .for_each(|rdesc| {
            let filename = rdesc.file_name().into_string().unwrap();
            let funcname = filename.replace([':', '.', '-'], "_");
            let path = rdesc.path();
            writeln!(file, "
#[test]
#[allow(non_snake_case)]
fn test_{funcname}() {{
    let bytes: Vec<u8> = std::fs::read({path:?}).unwrap();
    if bytes.is_empty() {{
        return;
    }}
    let slot = DeviceSlot::new();
    let mut device = slot.request(Limits::default()).unwrap();
    device.set_descriptor(&bytes).unwrap();
    device.open().expect(&format!(\"Failed to parse {filename}\"));

    for report_type in ReportType::ALL {{
        let numbered = device.registry().report_enum(report_type).is_numbered();
        let reports: Vec<(ReportId, usize)> = device
            .registry()
            .reports(report_type)
            .iter()
            .map(|r| (r.id(), r.byte_len()))
            .collect();
        for (id, len) in reports {{
            let mut data = vec![0u8; len];
            if numbered {{
                data.insert(0, id.0);
            }}
            device
                .decode_report(report_type, &data, &mut |_: &Field, _: &FieldUsage, _: i32| {{}})
                .expect(&format!(\"Failed to decode {{report_type:?}} report {{id}} of {filename}\"));
        }}
    }}
}}
").unwrap();
        });

    Ok(())
}
