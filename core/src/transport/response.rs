/*
 * response.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Corriere, an asynchronous HTTP client transport.
 *
 * Corriere is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Corriere is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Corriere.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Response returned by the transport once the head has arrived. The body is still on the
//! wire and is read through [`ResponseBody`].

use bytes::Bytes;

use crate::protocol::http::{find_header, HttpVersion, ResponseHead};
use crate::transport::body::ResponseBody;
use crate::transport::error::TransportError;
use crate::transport::extensions::Extensions;

#[derive(Debug)]
pub struct Response {
    status: u16,
    reason: String,
    version: HttpVersion,
    headers: Vec<(String, String)>,
    extensions: Extensions,
    body: ResponseBody,
}

impl Response {
    pub(crate) fn new(head: ResponseHead, extensions: Extensions, body: ResponseBody) -> Self {
        let reason = head.reason_phrase().to_string();
        Self {
            status: head.status,
            reason,
            version: head.version,
            headers: head.headers,
            extensions,
            body,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// Reason phrase from the status line, or the canonical one for HTTP/2.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn version(&self) -> HttpVersion {
        self.version
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn body_mut(&mut self) -> &mut ResponseBody {
        &mut self.body
    }

    pub fn into_body(self) -> ResponseBody {
        self.body
    }

    /// Next body chunk; see [`ResponseBody::next_chunk`].
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        self.body.next_chunk().await
    }

    /// Read the whole body.
    pub async fn bytes(self) -> Result<Bytes, TransportError> {
        self.body.bytes().await
    }

    /// Stop reading the body; see [`ResponseBody::close`].
    pub fn close(&mut self) {
        self.body.close();
    }
}
