//! Splitting a legacy path into module-path and classpath parts.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use trellis_project::PathEntry;

const MODULE_INFO_CLASS_CANDIDATES: [&str; 2] =
    ["module-info.class", "META-INF/versions/9/module-info.class"];

const MANIFEST: &str = "META-INF/MANIFEST.MF";

/// How a module candidate's name was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ModuleOrigin {
    /// A compiled `module-info.class` is present.
    Explicit,
    /// `Automatic-Module-Name` in the jar manifest.
    Manifest,
    /// Derived from the file name.
    Filename,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleCandidate {
    pub name: String,
    pub entry: PathEntry,
    pub origin: ModuleOrigin,
    /// Modules read by an explicit module. Automatic modules declare none.
    pub requires: Vec<String>,
}

/// One `requires` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRequires {
    pub module: String,
    pub is_transitive: bool,
    pub is_static: bool,
}

/// The parts of a module declaration that decide module-path membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDeclaration {
    pub name: String,
    pub requires: Vec<ModuleRequires>,
}

impl ModuleDeclaration {
    pub fn required_names(&self) -> impl Iterator<Item = &str> {
        self.requires.iter().map(|req| req.module.as_str())
    }
}

/// Decide whether `entry` can be placed on the module path, and under which name.
///
/// Archives are always candidates (plain jars become automatic modules); directories only
/// when they contain a compiled module descriptor. Archives that don't exist yet are named
/// after their file so declared-but-missing artifacts keep their place.
pub fn inspect_entry(entry: &PathEntry) -> Option<ModuleCandidate> {
    let candidate = |name: String, origin| ModuleCandidate {
        name,
        entry: entry.clone(),
        origin,
        requires: Vec::new(),
    };
    let explicit = |bytes: &[u8]| match module_declaration_from_class(bytes) {
        Some(declaration) => ModuleCandidate {
            requires: declaration.required_names().map(str::to_string).collect(),
            ..candidate(declaration.name, ModuleOrigin::Explicit)
        },
        None => candidate(
            derive_automatic_module_name(&entry.path),
            ModuleOrigin::Explicit,
        ),
    };

    if !entry.is_archive() {
        let bytes = MODULE_INFO_CLASS_CANDIDATES
            .iter()
            .find_map(|name| std::fs::read(entry.path.join(name)).ok())?;
        return Some(explicit(&bytes));
    }

    if !entry.path.exists() {
        return Some(candidate(
            derive_automatic_module_name(&entry.path),
            ModuleOrigin::Filename,
        ));
    }

    let metadata = match read_archive_metadata(&entry.path) {
        Ok(metadata) => metadata,
        Err(err) => {
            tracing::debug!(
                target = "trellis.classpath",
                path = %entry.path.display(),
                error = %err,
                "failed to read archive while inferring module metadata"
            );
            ArchiveMetadata::default()
        }
    };

    if let Some(bytes) = metadata.module_info {
        return Some(explicit(&bytes));
    }
    if let Some(name) = metadata
        .manifest
        .as_deref()
        .and_then(automatic_module_name_from_manifest)
    {
        return Some(candidate(name, ModuleOrigin::Manifest));
    }
    Some(candidate(
        derive_automatic_module_name(&entry.path),
        ModuleOrigin::Filename,
    ))
}

#[derive(Default)]
struct ArchiveMetadata {
    module_info: Option<Vec<u8>>,
    manifest: Option<Vec<u8>>,
}

fn read_archive_metadata(path: &Path) -> Result<ArchiveMetadata, zip::result::ZipError> {
    let mut zip = zip::ZipArchive::new(File::open(path)?)?;
    let mut read = |name: &str| -> Result<Option<Vec<u8>>, zip::result::ZipError> {
        match zip.by_name(name) {
            Ok(mut entry) => {
                let mut buf = Vec::new();
                entry.read_to_end(&mut buf)?;
                Ok(Some(buf))
            }
            Err(zip::result::ZipError::FileNotFound) => Ok(None),
            Err(err) => Err(err),
        }
    };

    let mut metadata = ArchiveMetadata::default();
    for name in MODULE_INFO_CLASS_CANDIDATES {
        if let Some(bytes) = read(name)? {
            metadata.module_info = Some(bytes);
            break;
        }
    }
    metadata.manifest = read(MANIFEST)?;
    Ok(metadata)
}

fn automatic_module_name_from_manifest(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    let name = manifest_main_attribute(&text, "Automatic-Module-Name")?;
    (!name.is_empty()).then_some(name)
}

fn manifest_main_attribute(manifest: &str, key: &str) -> Option<String> {
    let mut current: Option<(&str, String)> = None;

    for line in manifest.lines() {
        let line = line.trim_end_matches('\r');
        // The main section ends at the first empty line.
        if line.is_empty() {
            break;
        }
        if let Some(rest) = line.strip_prefix(' ') {
            if let Some((_, value)) = current.as_mut() {
                value.push_str(rest);
            }
            continue;
        }
        if let Some((name, value)) = current.take() {
            if name.trim().eq_ignore_ascii_case(key) {
                return Some(value.trim().to_string());
            }
        }
        if let Some((name, value)) = line.split_once(':') {
            current = Some((name, value.trim_start().to_string()));
        }
    }

    current
        .filter(|(name, _)| name.trim().eq_ignore_ascii_case(key))
        .map(|(_, value)| value.trim().to_string())
}

/// Automatic module name following the JDK's `ModuleFinder` rules.
pub fn derive_automatic_module_name(path: &Path) -> String {
    let file_name = if is_named_archive(path) {
        path.file_stem()
    } else {
        path.file_name()
    };
    let stem = file_name.and_then(|stem| stem.to_str()).unwrap_or("unnamed");
    let stem = strip_version_suffix(stem);

    let parts: Vec<String> = stem
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            if part.starts_with(|c: char| c.is_ascii_digit()) {
                format!("_{part}")
            } else {
                part.to_string()
            }
        })
        .collect();

    if parts.is_empty() {
        "_".to_string()
    } else {
        parts.join(".")
    }
}

fn is_named_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jar") || ext.eq_ignore_ascii_case("jmod"))
}

/// Drop a trailing `-<digits>(.|$)...` version suffix.
fn strip_version_suffix(stem: &str) -> &str {
    let bytes = stem.as_bytes();
    for (i, window) in bytes.windows(2).enumerate() {
        if window[0] != b'-' || !window[1].is_ascii_digit() {
            continue;
        }
        let digits_end = bytes[i + 1..]
            .iter()
            .position(|b| !b.is_ascii_digit())
            .map_or(bytes.len(), |offset| i + 1 + offset);
        if digits_end == bytes.len() || bytes[digits_end] == b'.' {
            return &stem[..i];
        }
    }
    stem
}

/// Read the module name from a compiled `module-info.class`.
pub fn module_name_from_class(bytes: &[u8]) -> Option<String> {
    module_declaration_from_class(bytes).map(|declaration| declaration.name)
}

const ACC_TRANSITIVE: u16 = 0x0020;
const ACC_STATIC_PHASE: u16 = 0x0040;

/// Read name and `requires` from a compiled `module-info.class`.
///
/// Walks the constant pool and the class attributes to the `Module` attribute. Returns
/// `None` for anything malformed.
pub fn module_declaration_from_class(bytes: &[u8]) -> Option<ModuleDeclaration> {
    let mut reader = ClassReader { bytes, pos: 0 };
    if reader.u4()? != 0xCAFE_BABE {
        return None;
    }
    reader.skip(4)?;

    let pool_count = reader.u2()? as usize;
    let mut pool: Vec<Constant<'_>> = vec![Constant::Unused; pool_count.max(1)];
    let mut index = 1;
    while index < pool_count {
        let tag = reader.u1()?;
        let constant = match tag {
            1 => {
                let len = reader.u2()? as usize;
                Constant::Utf8(reader.take(len)?)
            }
            7 | 8 | 16 | 20 => {
                reader.skip(2)?;
                Constant::Other
            }
            19 => Constant::Module(reader.u2()?),
            3 | 4 | 9 | 10 | 11 | 12 | 17 | 18 => {
                reader.skip(4)?;
                Constant::Other
            }
            15 => {
                reader.skip(3)?;
                Constant::Other
            }
            5 | 6 => {
                reader.skip(8)?;
                pool[index] = Constant::Other;
                index += 2;
                continue;
            }
            _ => return None,
        };
        pool[index] = constant;
        index += 1;
    }

    // access_flags, this_class, super_class
    reader.skip(6)?;
    let interfaces = reader.u2()? as usize;
    reader.skip(interfaces * 2)?;
    for _ in 0..2 {
        // fields, then methods
        let count = reader.u2()?;
        for _ in 0..count {
            reader.skip(6)?;
            reader.skip_attributes()?;
        }
    }

    let utf8 = |index: u16| match pool.get(index as usize) {
        Some(Constant::Utf8(bytes)) => std::str::from_utf8(bytes).ok(),
        _ => None,
    };

    let module_name = |index: u16| match pool.get(index as usize) {
        Some(Constant::Module(name_index)) => utf8(*name_index).map(|name| name.replace('/', ".")),
        _ => None,
    };

    let attributes = reader.u2()?;
    for _ in 0..attributes {
        let name_index = reader.u2()?;
        let len = reader.u4()? as usize;
        let body = reader.take(len)?;
        if utf8(name_index) != Some("Module") {
            continue;
        }
        let mut body = ClassReader { bytes: body, pos: 0 };
        let name = module_name(body.u2()?)?;
        // module_flags, module_version_index
        body.skip(4)?;
        // A truncated requires table still leaves a usable name.
        let requires = read_requires(&mut body, &module_name).unwrap_or_default();
        return Some(ModuleDeclaration { name, requires });
    }
    None
}

fn read_requires(
    body: &mut ClassReader<'_>,
    module_name: &impl Fn(u16) -> Option<String>,
) -> Option<Vec<ModuleRequires>> {
    let count = body.u2()?;
    let mut requires = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let module = module_name(body.u2()?)?;
        let flags = body.u2()?;
        body.skip(2)?;
        requires.push(ModuleRequires {
            module,
            is_transitive: flags & ACC_TRANSITIVE != 0,
            is_static: flags & ACC_STATIC_PHASE != 0,
        });
    }
    Some(requires)
}

/// Parse a `module-info.java` source far enough to know the module's name and `requires`.
///
/// Returns `None` when the text is not a module declaration.
pub fn parse_module_declaration(source: &str) -> Option<ModuleDeclaration> {
    let tokens = tokenize(source)?;
    let mut tokens = tokens.iter().map(String::as_str).peekable();

    // Imports and annotations may precede the declaration.
    loop {
        match *tokens.peek()? {
            "import" => {
                tokens.find(|token| *token == ";")?;
            }
            "@" => {
                tokens.next();
                tokens.next()?;
                if tokens.peek() == Some(&"(") {
                    let mut depth = 0usize;
                    for token in tokens.by_ref() {
                        match token {
                            "(" => depth += 1,
                            ")" => {
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
            "open" => {
                tokens.next();
            }
            "module" => {
                tokens.next();
                break;
            }
            _ => return None,
        }
    }

    let name = tokens.next().filter(|token| is_qualified_name(token))?.to_string();
    if tokens.next()? != "{" {
        return None;
    }

    let mut requires = Vec::new();
    loop {
        match tokens.next()? {
            "}" => break,
            "requires" => {
                let mut directive: Vec<&str> = Vec::new();
                loop {
                    match tokens.next()? {
                        ";" => break,
                        token => directive.push(token),
                    }
                }
                // Modifiers are only modifiers when a module name follows them.
                let (module, modifiers) = directive.split_last()?;
                if !is_qualified_name(module) {
                    return None;
                }
                requires.push(ModuleRequires {
                    module: module.to_string(),
                    is_transitive: modifiers.contains(&"transitive"),
                    is_static: modifiers.contains(&"static"),
                });
            }
            _ => {
                tokens.find(|token| *token == ";")?;
            }
        }
    }

    Some(ModuleDeclaration { name, requires })
}

fn is_qualified_name(token: &str) -> bool {
    !token.is_empty()
        && token
            .split('.')
            .all(|part| part.starts_with(|c: char| c.is_alphabetic() || c == '_' || c == '$'))
}

/// Split Java source into identifiers (dotted names kept whole) and punctuation.
///
/// Comments and string literals are dropped. Returns `None` on an unterminated comment
/// or literal.
fn tokenize(source: &str) -> Option<Vec<String>> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '/' if chars.peek() == Some(&'/') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut star = false;
                loop {
                    let c = chars.next()?;
                    if star && c == '/' {
                        break;
                    }
                    star = c == '*';
                }
            }
            '"' => {
                let mut escaped = false;
                loop {
                    let c = chars.next()?;
                    if !escaped && c == '"' {
                        break;
                    }
                    escaped = !escaped && c == '\\';
                }
            }
            c if c.is_alphanumeric() || c == '_' || c == '$' => {
                let mut word = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_alphanumeric() || next == '_' || next == '$' || next == '.' {
                        word.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(word);
            }
            c if c.is_whitespace() => {}
            c => tokens.push(c.to_string()),
        }
    }
    Some(tokens)
}

#[derive(Clone, Copy)]
enum Constant<'a> {
    Unused,
    Utf8(&'a [u8]),
    Module(u16),
    Other,
}

struct ClassReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ClassReader<'a> {
    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let slice = self.bytes.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn skip(&mut self, len: usize) -> Option<()> {
        self.take(len).map(|_| ())
    }

    fn u1(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    fn u2(&mut self) -> Option<u16> {
        self.take(2).map(|b| u16::from_be_bytes([b[0], b[1]]))
    }

    fn u4(&mut self) -> Option<u32> {
        self.take(4).map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn skip_attributes(&mut self) -> Option<()> {
        let count = self.u2()?;
        for _ in 0..count {
            self.skip(2)?;
            let len = self.u4()? as usize;
            self.skip(len)?;
        }
        Some(())
    }
}

/// The two halves of a module-mode path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposedPath {
    pub module_path: Vec<PathEntry>,
    /// Entries that are not usable as modules; they stay on the classpath.
    pub classpath: Vec<PathEntry>,
}

/// Inputs of a module-mode composition.
#[derive(Debug, Clone, Copy)]
pub struct ModuleComposition<'a> {
    /// Entries that always lead the module path (e.g. the main module's output when
    /// composing the test module path).
    pub base: &'a [PathEntry],
    /// Platform modules; user candidates may not reuse their names.
    pub system_modules: &'a [PathEntry],
    /// The legacy path being split.
    pub legacy: &'a [PathEntry],
    /// The declaration read from the project's own source roots. When present, only
    /// candidates in its `requires` closure go on the module path; `None` keeps every
    /// candidate.
    pub descriptor: Option<&'a ModuleDeclaration>,
}

impl ModuleComposition<'_> {
    pub fn compose(&self) -> ComposedPath {
        self.compose_with(inspect_entry)
    }

    pub(crate) fn compose_with(
        &self,
        mut inspect: impl FnMut(&PathEntry) -> Option<ModuleCandidate>,
    ) -> ComposedPath {
        let mut reserved: HashSet<String> = self
            .system_modules
            .iter()
            .map(|entry| derive_automatic_module_name(&entry.path))
            .collect();

        let mut composed = ComposedPath::default();
        let mut roots: Vec<String> = Vec::new();
        for entry in self.base {
            if let Some(candidate) = inspect(entry) {
                roots.extend(candidate.requires);
                reserved.insert(candidate.name);
            }
            composed.module_path.push(entry.clone());
        }

        // Legacy entries in order, each either a uniquely named module or a classpath entry.
        let mut placed: Vec<(&PathEntry, Option<ModuleCandidate>)> = Vec::new();
        for entry in self.legacy {
            if self.base.iter().any(|base| base.path == entry.path) {
                continue;
            }
            let candidate = match inspect(entry) {
                Some(candidate) if reserved.insert(candidate.name.clone()) => Some(candidate),
                Some(candidate) => {
                    tracing::debug!(
                        target = "trellis.classpath",
                        module = %candidate.name,
                        path = %entry.path.display(),
                        "module name already taken; keeping entry on the classpath"
                    );
                    None
                }
                None => None,
            };
            placed.push((entry, candidate));
        }

        let required = self.descriptor.map(|descriptor| {
            roots.extend(descriptor.required_names().map(str::to_string));
            let by_name: HashMap<&str, &ModuleCandidate> = placed
                .iter()
                .filter_map(|(_, candidate)| candidate.as_ref())
                .map(|candidate| (candidate.name.as_str(), candidate))
                .collect();
            required_closure(roots, &by_name)
        });

        for (entry, candidate) in placed {
            match (candidate, &required) {
                (Some(candidate), Some(required)) if !required.contains(&candidate.name) => {
                    tracing::debug!(
                        target = "trellis.classpath",
                        module = %candidate.name,
                        path = %entry.path.display(),
                        "module not required by the project module; keeping entry on the classpath"
                    );
                    composed.classpath.push(entry.clone());
                }
                (Some(_), _) => composed.module_path.push(entry.clone()),
                (None, _) => composed.classpath.push(entry.clone()),
            }
        }
        composed
    }
}

/// Module names reachable from `roots` through the `requires` of known candidates.
fn required_closure(
    roots: Vec<String>,
    candidates: &HashMap<&str, &ModuleCandidate>,
) -> HashSet<String> {
    let mut required = HashSet::new();
    let mut pending = roots;
    while let Some(name) = pending.pop() {
        if !required.insert(name.clone()) {
            continue;
        }
        if let Some(candidate) = candidates.get(name.as_str()) {
            pending.extend(candidate.requires.iter().cloned());
        }
    }
    required
}
