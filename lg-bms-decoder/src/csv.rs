use crate::manager::ModuleManager;
use core::fmt::Write;
use embassy_time::Instant;

/// Column names matching the rows of [`write_csv_rows`]
pub const CSV_HEADER: &str = "timestamp,current,soc,module,\
cell0,cell1,cell2,cell3,cell4,cell5,cell6,cell7,\
cell8,cell9,cell10,cell11,cell12,cell13,cell14,cell15,\
temp0,temp1";

/// Write one row per valid module and return the number of rows.
///
/// `timestamp`, `current` and `soc` come from outside the pack and are copied
/// into every row.
pub fn write_csv_rows<W: Write, const N: usize>(
    writer: &mut W,
    manager: &ModuleManager<N>,
    now: Instant,
    timestamp: u64,
    current: f32,
    soc: i32,
) -> Result<usize, core::fmt::Error> {
    let mut rows = 0;
    for (address, module) in manager.valid_modules(now) {
        write!(writer, "{timestamp},{current:.0},{soc},{address}")?;
        for volts in module.cell_voltages() {
            write!(writer, ",{volts:.2}")?;
        }
        for celsius in module.temperatures() {
            write!(writer, ",{celsius:.2}")?;
        }
        writer.write_char('\n')?;
        rows += 1;
    }
    Ok(rows)
}
