//! Generic `Signature` attribute rewriting.
//!
//! Handles class, method and field signatures with a single recursive-descent
//! pass that copies everything except class names, which are passed through
//! the supplied mapping. Inner class segments (`Outer<T>.Inner`) are mapped as
//! `Outer$Inner` and written back as the mapped simple name.

use anyhow::{bail, Result};

pub fn remap_signature<F>(signature: &str, map: F) -> Result<String>
where
    F: FnMut(&str) -> String,
{
    let mut remapper = SignatureRemapper {
        src: signature,
        pos: 0,
        out: String::with_capacity(signature.len()),
        map,
    };
    remapper.run()?;
    Ok(remapper.out)
}

/// Class names referenced anywhere in a signature.
pub fn signature_classes(signature: &str) -> Result<Vec<String>> {
    let mut found = Vec::new();
    remap_signature(signature, |name| {
        found.push(name.to_string());
        name.to_string()
    })?;
    Ok(found)
}

struct SignatureRemapper<'a, F> {
    src: &'a str,
    pos: usize,
    out: String,
    map: F,
}

impl<'a, F> SignatureRemapper<'a, F>
where
    F: FnMut(&str) -> String,
{
    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn bump(&mut self) -> Result<()> {
        match self.peek() {
            Some(b) => {
                self.out.push(b as char);
                self.pos += 1;
                Ok(())
            }
            None => bail!("unexpected end of signature {:?}", self.src),
        }
    }

    fn expect(&mut self, wanted: u8) -> Result<()> {
        if self.peek() != Some(wanted) {
            bail!(
                "expected {:?} at offset {} in signature {:?}",
                wanted as char,
                self.pos,
                self.src
            );
        }
        self.bump()
    }

    /// Reads up to (not including) the first byte in `stops`.
    fn ident(&mut self, stops: &[u8]) -> Result<&'a str> {
        let src = self.src;
        let start = self.pos;
        while let Some(b) = self.peek() {
            if stops.contains(&b) {
                return Ok(&src[start..self.pos]);
            }
            self.pos += 1;
        }
        bail!("unterminated identifier in signature {:?}", self.src)
    }

    fn run(&mut self) -> Result<()> {
        if self.peek() == Some(b'<') {
            self.type_params()?;
        }
        if self.peek() == Some(b'(') {
            self.bump()?;
            while self.peek() != Some(b')') {
                self.java_type()?;
            }
            self.bump()?;
            if self.peek() == Some(b'V') {
                self.bump()?;
            } else {
                self.java_type()?;
            }
            while self.peek() == Some(b'^') {
                self.bump()?;
                self.reference_type()?;
            }
            if self.pos != self.src.len() {
                bail!("trailing characters in method signature {:?}", self.src);
            }
        } else {
            while self.pos < self.src.len() {
                self.java_type()?;
            }
        }
        Ok(())
    }

    fn type_params(&mut self) -> Result<()> {
        self.expect(b'<')?;
        while self.peek() != Some(b'>') {
            let name = self.ident(b":")?;
            self.out.push_str(name);
            self.expect(b':')?;
            if !matches!(self.peek(), Some(b':') | Some(b'>')) {
                self.reference_type()?;
            }
            while self.peek() == Some(b':') {
                self.bump()?;
                self.reference_type()?;
            }
        }
        self.expect(b'>')
    }

    fn java_type(&mut self) -> Result<()> {
        match self.peek() {
            Some(b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z') => self.bump(),
            _ => self.reference_type(),
        }
    }

    fn reference_type(&mut self) -> Result<()> {
        match self.peek() {
            Some(b'L') => self.class_type(),
            Some(b'T') => {
                self.bump()?;
                let var = self.ident(b";")?;
                self.out.push_str(var);
                self.expect(b';')
            }
            Some(b'[') => {
                self.bump()?;
                self.java_type()
            }
            _ => bail!(
                "expected reference type at offset {} in signature {:?}",
                self.pos,
                self.src
            ),
        }
    }

    fn class_type(&mut self) -> Result<()> {
        self.expect(b'L')?;
        let outer = self.ident(b"<.;")?;
        let mut original = outer.to_string();
        let mut mapped = (self.map)(&original);
        self.out.push_str(&mapped);
        loop {
            if self.peek() == Some(b'<') {
                self.type_args()?;
            }
            match self.peek() {
                Some(b'.') => {
                    self.bump()?;
                    let inner = self.ident(b"<.;")?;
                    original = format!("{}${}", original, inner);
                    let mapped_inner = (self.map)(&original);
                    let prefix = format!("{}$", mapped);
                    let simple = match mapped_inner.strip_prefix(&prefix) {
                        Some(simple) => simple.to_string(),
                        None => mapped_inner
                            .rsplit(['$', '/'])
                            .next()
                            .unwrap_or(inner)
                            .to_string(),
                    };
                    self.out.push_str(&simple);
                    mapped = mapped_inner;
                }
                Some(b';') => return self.bump(),
                _ => bail!("unterminated class type in signature {:?}", self.src),
            }
        }
    }

    fn type_args(&mut self) -> Result<()> {
        self.expect(b'<')?;
        while self.peek() != Some(b'>') {
            match self.peek() {
                Some(b'*') => self.bump()?,
                Some(b'+' | b'-') => {
                    self.bump()?;
                    self.reference_type()?;
                }
                _ => self.reference_type()?,
            }
        }
        self.expect(b'>')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rename(name: &str) -> String {
        match name {
            "a/Outer" => "x/Renamed".to_string(),
            "a/Outer$Inner" => "x/Renamed$Nested".to_string(),
            "a/Item" => "x/Thing".to_string(),
            other => other.to_string(),
        }
    }

    #[test]
    fn test_field_signature() {
        let out = remap_signature("Ljava/util/List<La/Item;>;", rename).unwrap();
        assert_eq!(out, "Ljava/util/List<Lx/Thing;>;");
    }

    #[test]
    fn test_class_signature_with_type_params() {
        let sig = "<L:La/Item;T::Ljava/lang/Comparable<TT;>;>Ljava/lang/Object;";
        let out = remap_signature(sig, rename).unwrap();
        assert_eq!(
            out,
            "<L:Lx/Thing;T::Ljava/lang/Comparable<TT;>;>Ljava/lang/Object;"
        );
    }

    #[test]
    fn test_method_signature_with_throws() {
        let sig = "<E:Ljava/lang/Exception;>(Ljava/util/Map<+La/Item;*>;[I)La/Item;^TE;";
        let out = remap_signature(sig, rename).unwrap();
        assert_eq!(
            out,
            "<E:Ljava/lang/Exception;>(Ljava/util/Map<+Lx/Thing;*>;[I)Lx/Thing;^TE;"
        );
    }

    #[test]
    fn test_inner_class_segment() {
        let out = remap_signature("La/Outer<La/Item;>.Inner;", rename).unwrap();
        assert_eq!(out, "Lx/Renamed<Lx/Thing;>.Nested;");
    }

    #[test]
    fn test_signature_classes() {
        let names = signature_classes("(La/Item;)Ljava/util/List<La/Outer;>;").unwrap();
        assert_eq!(names, vec!["a/Item", "java/util/List", "a/Outer"]);
    }

    #[test]
    fn test_malformed_signature() {
        assert!(remap_signature("Ljava/util/List<", rename).is_err());
    }
}
