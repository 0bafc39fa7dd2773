use chbridge_api::{ColumnDescriptor, ColumnType};

use super::error::CliError;
use crate::DescribeArgs;

pub fn run(args: &DescribeArgs) -> Result<(), CliError> {
    let mut failed = 0;
    for name in &args.types {
        match describe(name) {
            Ok(line) => println!("{line}"),
            Err(e) => {
                failed += 1;
                println!("{name}\terror: {e}");
            }
        }
    }
    if failed > 0 {
        return Err(CliError::Unmapped(failed, args.types.len()));
    }
    Ok(())
}

/// `wire type → external type (oid)`, with a nullability marker.
fn describe(name: &str) -> Result<String, CliError> {
    let ty: ColumnType = name.parse()?;
    let d = ColumnDescriptor::describe(name, ty)?;
    let null = if d.nullable { "null" } else { "not null" };
    Ok(format!(
        "{}\t{} ({})\t{null}",
        d.column_type,
        d.external_type,
        d.external_type.oid()
    ))
}
