//! Schema inspection: `schema list` and `schema show`.

use rekon_core::{DescriptorSet, FieldDescriptor, ResourceSchema};
use tabled::Tabled;

use crate::cli::{GlobalOpts, SchemaArgs, SchemaCommand};
use crate::config;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "Resource")]
    name: String,
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Id")]
    id_field: String,
    #[tabled(rename = "Fields")]
    fields: usize,
}

impl From<&ResourceSchema> for ResourceRow {
    fn from(r: &ResourceSchema) -> Self {
        Self {
            name: r.name.clone(),
            path: r.path.clone(),
            id_field: r.id_field.clone(),
            fields: r.fields.len(),
        }
    }
}

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    name: String,
    #[tabled(rename = "Wire")]
    wire: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Type")]
    scalar_type: String,
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Req")]
    required: String,
    #[tabled(rename = "Default")]
    default: String,
    #[tabled(rename = "Coercion")]
    coercion: String,
}

pub fn handle(args: &SchemaArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load(global)?;
    let schema = config::load_schema(global, &cfg)?;

    let out = match &args.command {
        SchemaCommand::List => {
            let resources: Vec<&ResourceSchema> = schema.resources().collect();
            output::render_list(
                &global.output,
                &resources,
                |r| ResourceRow::from(*r),
                |r| r.name.clone(),
            )?
        }
        SchemaCommand::Show { resource } => {
            let resource = schema.resource(resource)?;
            output::render_single(
                &global.output,
                resource,
                |r| {
                    let mut rows = Vec::new();
                    collect_rows(&r.fields, "", &mut rows);
                    output::render_table(&rows)
                },
                |r| {
                    let mut rows = Vec::new();
                    collect_rows(&r.fields, "", &mut rows);
                    rows.into_iter().map(|row| row.name).collect::<Vec<_>>().join("\n")
                },
            )?
        }
    };
    output::print_output(&out, global.quiet);
    Ok(())
}

/// Depth-first rows; nested fields are named `table.field`.
fn collect_rows(fields: &DescriptorSet, prefix: &str, rows: &mut Vec<FieldRow>) {
    for field in fields.iter() {
        let name = format!("{prefix}{}", field.name);
        rows.push(field_row(field, name.clone()));
        if field.is_table() {
            collect_rows(&field.fields, &format!("{name}."), rows);
        }
    }
}

fn field_row(field: &FieldDescriptor, name: String) -> FieldRow {
    let coercion = field
        .coercion
        .iter()
        .map(|rule| {
            let since = rule.since.as_ref().map(ToString::to_string).unwrap_or_default();
            let below = rule.below.as_ref().map(ToString::to_string).unwrap_or_default();
            format!("[{since}, {below}) -> {}", rule.encode)
        })
        .collect::<Vec<_>>()
        .join("; ");
    FieldRow {
        name,
        wire: field.wire_name.clone(),
        kind: field.kind.to_string(),
        scalar_type: if field.is_table() {
            "-".into()
        } else {
            field.scalar_type.to_string()
        },
        key: field.key_field.clone().unwrap_or_default(),
        required: if field.required { "yes".into() } else { String::new() },
        default: field.default.as_ref().map(ToString::to_string).unwrap_or_default(),
        coercion,
    }
}
