// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! End-to-end config loading tests (SPEC_FULL.md §10.6): write a real XML
//! document to a temp file and load it through the same `config::load` path
//! `main` uses, rather than parsing a string in-process.

use std::io::Write;

use icesrc::config;

fn write_fixture(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("create temp config file");
    file.write_all(contents.as_bytes()).expect("write temp config file");
    file
}

#[test]
fn loads_full_document_with_two_instances() {
    let file = write_fixture(
        r#"
        <ices>
          <background>0</background>
          <logpath>/tmp</logpath>
          <logfile>icesrc.log</logfile>
          <loglevel>4</loglevel>
          <stream>
            <metadata>
              <name>Example Stream</name>
              <genre>Ambient</genre>
            </metadata>
            <input>
              <module>stdin</module>
              <param name="rate">48000</param>
              <param name="channels">2</param>
            </input>
            <instance>
              <hostname>icecast.example.com</hostname>
              <port>8080</port>
              <password>hunter2</password>
              <mount>/live.ogg</mount>
              <encode>
                <nominal-bitrate>96000</nominal-bitrate>
              </encode>
            </instance>
            <instance>
              <hostname>icecast.example.com</hostname>
              <port>8080</port>
              <password>hunter2</password>
              <mount>/live.ogg</mount>
              <encode>
                <quality>2</quality>
              </encode>
            </instance>
          </stream>
        </ices>
        "#,
    );

    let loaded = config::load(file.path()).expect("config loads");
    assert_eq!(loaded.config.loglevel, 4);
    assert_eq!(loaded.config.stream.instances.len(), 2);

    let instances: Vec<_> =
        loaded.config.stream.instances.iter().enumerate().map(|(i, xml)| config::to_instance_config(i, xml)).collect();

    assert_eq!(instances[0].name, "icecast.example.com:8080/live.ogg");
    assert_eq!(instances[1].name, "icecast.example.com:8080/live.ogg#1");
    assert_eq!(instances[0].encode.expect("encode block").nominal_bitrate, 96000);
    assert_eq!(instances[1].encode.expect("encode block").quality, 2.0);
}

#[test]
fn rejects_unparseable_xml() {
    let file = write_fixture("<ices><stream>not valid xml");
    assert!(config::load(file.path()).is_err());
}

#[test]
fn rejects_missing_file() {
    let path = std::path::Path::new("/nonexistent/path/to/icesrc.xml");
    assert!(config::load(path).is_err());
}
