use crate::assembler::{CallPathContext, EntryKind};
use anyhow::Result;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;

fn crunch_text_for_cdata(input: &str) -> String {
    // Trim trailing whitespace on each line; keep blank lines (they are part of the source).
    let mut trimmed = String::with_capacity(input.len());
    for part in input.split_inclusive('\n') {
        if let Some(line) = part.strip_suffix('\n') {
            trimmed.push_str(line.trim_end_matches([' ', '\t', '\r']));
            trimmed.push('\n');
        } else {
            trimmed.push_str(part.trim_end_matches([' ', '\t', '\r']));
        }
    }

    // A literal `]]>` would end the section early; split it across two sections.
    trimmed.trim_end().replace("]]>", "]]]]><![CDATA[>")
}

pub fn build_context_xml(ctx: &CallPathContext) -> Result<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

    let tokens = ctx.token_count.to_string();
    let mut root = BytesStart::new("callpath_context");
    root.push_attribute(("call_path", ctx.call_path.as_str()));
    root.push_attribute(("tokens", tokens.as_str()));
    root.push_attribute(("truncated", if ctx.truncated { "true" } else { "false" }));
    writer.write_event(Event::Start(root))?;

    for entry in &ctx.entries {
        let mut el = BytesStart::new("frame");
        el.push_attribute(("call_path", entry.call_path.as_str()));
        el.push_attribute(("region", entry.region_name.as_str()));
        match &entry.kind {
            EntryKind::Source { path } => {
                let path_text = path.to_string_lossy().replace('\\', "/");
                el.push_attribute(("kind", "source"));
                el.push_attribute(("path", path_text.as_str()));
            }
            EntryKind::Vendor => el.push_attribute(("kind", "vendor")),
        }
        writer.write_event(Event::Start(el))?;

        let content = crunch_text_for_cdata(&entry.text);
        writer.write_event(Event::CData(BytesCData::new(content.as_str())))?;
        writer.write_event(Event::End(BytesEnd::new("frame")))?;
    }

    writer.write_event(Event::Start(BytesStart::new("exclusions")))?;
    for frame in &ctx.exclusions {
        let mut el = BytesStart::new("frame");
        el.push_attribute(("call_path", frame.frame.as_str()));
        writer.write_event(Event::Start(el))?;
        for name in &frame.excluded {
            writer.write_event(Event::Start(BytesStart::new("callee")))?;
            writer.write_event(Event::Text(BytesText::new(name)))?;
            writer.write_event(Event::End(BytesEnd::new("callee")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("frame")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("exclusions")))?;

    writer.write_event(Event::End(BytesEnd::new("callpath_context")))?;

    let bytes = writer.into_inner().into_inner();
    Ok(String::from_utf8(bytes)?)
}
